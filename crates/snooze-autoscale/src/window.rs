//! "Must stay up" time windows.
//!
//! A route's `snooze.uptime` metadata holds comma-separated `HH:MM-HH:MM`
//! windows in local time. A window whose end is not after its start wraps
//! past midnight (`22:00-06:00`); `00:00-00:00` covers the whole day.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// One daily window, start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn parse(raw: &str) -> Option<Self> {
        let (start, end) = raw.trim().split_once('-')?;
        Some(Self {
            start: NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?,
            end: NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?,
        })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// A set of daily windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UptimeWindows {
    windows: Vec<TimeWindow>,
}

impl UptimeWindows {
    /// Parse a window list, skipping malformed entries.
    pub fn parse(spec: &str) -> Self {
        let windows = spec
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .filter_map(|raw| {
                let window = TimeWindow::parse(raw);
                if window.is_none() {
                    warn!(window = %raw, "ignoring malformed uptime window");
                }
                window
            })
            .collect();
        Self { windows }
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.windows.iter().any(|w| w.contains(time))
    }

    /// Whether `now`, seen in `tz`, falls inside any window.
    pub fn is_active(&self, now: DateTime<Utc>, tz: Tz) -> bool {
        self.contains(now.with_timezone(&tz).time())
    }
}

/// Resolve a route's timezone override, falling back to `default`.
pub fn route_timezone(raw: Option<&str>, default: Tz) -> Tz {
    match raw {
        Some(name) => name.trim().parse().unwrap_or_else(|_| {
            warn!(timezone = %name, "unknown route timezone, using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn office_hours_in_local_time() {
        let windows = UptimeWindows::parse("09:00-18:00");
        let paris: Tz = "Europe/Paris".parse().unwrap();

        // 10:00 and 20:00 in Paris (UTC+1 in January).
        let ten = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let twenty = Utc.with_ymd_and_hms(2024, 1, 15, 19, 0, 0).unwrap();
        assert!(windows.is_active(ten, paris));
        assert!(!windows.is_active(twenty, paris));

        // The same instants in UTC read 09:00 and 19:00.
        assert!(windows.is_active(ten, Tz::UTC));
        assert!(!windows.is_active(twenty, Tz::UTC));
    }

    #[test]
    fn end_is_exclusive() {
        let window = TimeWindow::parse("09:00-18:00").unwrap();
        assert!(window.contains(hm(9, 0)));
        assert!(window.contains(hm(17, 59)));
        assert!(!window.contains(hm(18, 0)));
    }

    #[test]
    fn windows_wrap_past_midnight() {
        let windows = UptimeWindows::parse("22:00-06:00");
        assert!(windows.contains(hm(23, 30)));
        assert!(windows.contains(hm(5, 59)));
        assert!(!windows.contains(hm(12, 0)));

        assert!(UptimeWindows::parse("00:00-00:00").contains(hm(13, 37)));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let windows = UptimeWindows::parse("nonsense, 25:00-26:00, 08:00-09:00,,");
        assert!(!windows.is_empty());
        assert!(windows.contains(hm(8, 30)));
        assert!(!windows.contains(hm(10, 0)));
        assert!(UptimeWindows::parse("garbage").is_empty());
    }

    #[test]
    fn route_timezone_falls_back() {
        assert_eq!(route_timezone(Some("Europe/Paris"), Tz::UTC), chrono_tz::Europe::Paris);
        assert_eq!(route_timezone(Some("Mars/Olympus"), Tz::UTC), Tz::UTC);
        assert_eq!(route_timezone(None, chrono_tz::Europe::Paris), chrono_tz::Europe::Paris);
    }
}
