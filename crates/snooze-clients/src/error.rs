//! Error types for collaborator calls.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by gateway and PaaS clients.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{op} returned unexpected status {status}")]
    Status { op: &'static str, status: u16 },

    #[error("malformed {what} payload: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl ClientError {
    pub(crate) fn decode(what: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }
}
