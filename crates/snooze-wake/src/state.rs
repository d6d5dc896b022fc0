//! Per-service wake state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of a service through the wake sequence.
///
/// Held in the context's state cache; a service with no entry is
/// untracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WakeState {
    /// App is (assumed) stopped; the next poll issues a start.
    Down,
    /// Start issued or app reported booting.
    Starting,
    /// App is up; the route is being restored.
    Routing,
    /// Route restored; waiters may be released.
    Ready,
}

impl WakeState {
    pub fn label(&self) -> &'static str {
        match self {
            WakeState::Down => "DOWN",
            WakeState::Starting => "STARTING",
            WakeState::Routing => "ROUTING",
            WakeState::Ready => "READY",
        }
    }
}

impl fmt::Display for WakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_label() {
        for state in [
            WakeState::Down,
            WakeState::Starting,
            WakeState::Routing,
            WakeState::Ready,
        ] {
            assert_eq!(
                serde_json::to_value(state).unwrap(),
                serde_json::json!(state.label())
            );
        }
    }
}
