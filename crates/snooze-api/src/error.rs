use thiserror::Error;

/// Errors raised while building or serving the HTTP surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid header name {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("gateway lookup failed: {0}")]
    Gateway(#[from] snooze_clients::ClientError),

    #[error("service {0} has no target")]
    NoTarget(String),

    #[error("failed to read request body: {0}")]
    Body(String),
}
