//! Error types for the wake path.

use thiserror::Error;

/// Outcome delivered to every waiter of a failed wake. `Clone` so a
/// single outcome fans out to all coalesced requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WakeError {
    #[error("App did not succeed to start")]
    DeadlineExceeded,

    #[error("wake abandoned before completion")]
    Abandoned,
}

/// Errors building a diverted or restored route.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("route {route_id} has no stashed {key}")]
    MissingStash { route_id: String, key: &'static str },

    #[error("route {route_id} has malformed stashed {key}: {reason}")]
    MalformedStash {
        route_id: String,
        key: &'static str,
        reason: String,
    },

    #[error("failed to stash targets: {0}")]
    Serialize(String),
}
