//! Savings arithmetic for suppressed apps.
//!
//! A suppressed app is billed in 10-minute increments: every started
//! increment counts, and at least one increment is always counted.

/// Length of one billing increment in milliseconds.
pub const INCREMENT_MILLIS: i64 = 600_000;

/// Price factor applied per instance per increment.
pub const PRICE_FACTOR: f64 = 0.0097;

/// Number of started increments between `shutdown_at` and `now` (min 1).
pub fn increments(now_millis: i64, shutdown_at_millis: i64) -> u64 {
    let elapsed = (now_millis - shutdown_at_millis).max(0) as f64;
    let increments = (elapsed / INCREMENT_MILLIS as f64).ceil() as u64;
    increments.max(1)
}

/// Amount saved, rounded to 5 decimals.
pub fn saved(increments: u64, min_instances: u32, min_flavor_price: f64) -> f64 {
    let raw = increments as f64 * min_instances as f64 * min_flavor_price * PRICE_FACTOR;
    round5(raw)
}

/// Amount saved by an app suppressed since `shutdown_at_millis`.
pub fn saved_since(
    now_millis: i64,
    shutdown_at_millis: i64,
    min_instances: u32,
    min_flavor_price: f64,
) -> f64 {
    saved(
        increments(now_millis, shutdown_at_millis),
        min_instances,
        min_flavor_price,
    )
}

/// Round to 5 decimal places.
pub fn round5(value: f64) -> f64 {
    // `+ 0.0` turns a negative zero into a positive one.
    (value * 100_000.0).round() / 100_000.0 + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    #[test]
    fn sixty_five_minutes_is_seven_increments() {
        let now = 10_000 * MINUTE;
        let shutdown = now - 65 * MINUTE;
        assert_eq!(increments(now, shutdown), 7);
        assert_eq!(saved_since(now, shutdown, 1, 10.0), 0.679);
    }

    #[test]
    fn at_least_one_increment() {
        assert_eq!(increments(1_000, 1_000), 1);
        assert_eq!(increments(1_000, 999), 1);
        // Clock skew: shutdown in the future still counts once.
        assert_eq!(increments(1_000, 5_000), 1);
    }

    #[test]
    fn round5_never_yields_negative_zero() {
        assert!(round5(-0.0).is_sign_positive());
        assert!(round5(-0.000001).is_sign_positive());
        assert_eq!(round5(-1.234567), -1.23457);
    }

    #[test]
    fn exact_boundary_does_not_round_up() {
        assert_eq!(increments(2 * INCREMENT_MILLIS, 0), 2);
        assert_eq!(increments(2 * INCREMENT_MILLIS + 1, 0), 3);
    }

    #[test]
    fn scales_with_instances_and_rounds() {
        assert_eq!(saved(3, 2, 0.3436), round5(3.0 * 2.0 * 0.3436 * 0.0097));
        assert_eq!(saved(1, 0, 10.0), 0.0);
        assert_eq!(round5(0.123_456_789), 0.12346);
    }
}
