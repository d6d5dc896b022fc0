//! snooze-api — the orchestrator's HTTP surface.
//!
//! Diverted routes point the gateway here, so every request for a
//! suppressed service lands on the waiting-page handlers, which wake the
//! service and either hold the caller or serve a self-refreshing page.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | ANY | `/waiting-page/{service_id}/` | Wake the service; page, status or release |
//! | ANY | `/waiting-page/{service_id}/{*rest}` | Same, for nested paths |
//! | GET | `/api/savings` | Current and past savings |
//! | GET | `/api/health` | Liveness check |
//!
//! Every response echoes the gateway's state challenge (see
//! [`middleware::echo_state_header`]).

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod page;
pub mod proxy;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderName;
use axum::routing::{any, get};
use snooze_core::config::ServerConfig;
use snooze_wake::RequestCoalescer;

pub use error::ApiError;

/// Header names the HTTP surface reads and writes.
#[derive(Debug, Clone)]
pub struct ApiHeaders {
    /// Gateway state-challenge request header.
    pub state: HeaderName,
    /// Response header the challenge is echoed into.
    pub state_resp: HeaderName,
    /// Status sub-protocol marker.
    pub status: HeaderName,
}

impl ApiHeaders {
    pub fn new(state: &str, state_resp: &str, status: &str) -> Result<Self, ApiError> {
        Ok(Self {
            state: header_name(state)?,
            state_resp: header_name(state_resp)?,
            status: header_name(status)?,
        })
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self, ApiError> {
        Self::new(
            &server.state_header,
            &server.state_resp_header,
            &server.status_header,
        )
    }
}

impl Default for ApiHeaders {
    fn default() -> Self {
        Self {
            state: HeaderName::from_static("otoroshi-state"),
            state_resp: HeaderName::from_static("otoroshi-state-resp"),
            status: HeaderName::from_static("x-snooze"),
        }
    }
}

fn header_name(raw: &str) -> Result<HeaderName, ApiError> {
    HeaderName::from_bytes(raw.trim().as_bytes()).map_err(|e| ApiError::InvalidHeader {
        name: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Shared state for the handlers.
#[derive(Clone)]
pub struct ApiState {
    pub coalescer: Arc<RequestCoalescer>,
    pub headers: Arc<ApiHeaders>,
    /// Client used to forward released requests in proxy mode.
    pub http: reqwest::Client,
}

impl ApiState {
    pub fn new(coalescer: Arc<RequestCoalescer>, headers: ApiHeaders) -> Result<Self, ApiError> {
        Ok(Self {
            coalescer,
            headers: Arc::new(headers),
            http: proxy::forwarding_client()?,
        })
    }
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/waiting-page/{service_id}/", any(handlers::waiting_root))
        .route("/waiting-page/{service_id}/{*rest}", any(handlers::waiting_nested))
        .route("/api/savings", get(handlers::savings))
        .route("/api/health", get(handlers::health))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::echo_state_header,
        ))
        .with_state(state)
}
