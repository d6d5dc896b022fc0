//! Gateway state-challenge echo.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use crate::ApiState;

/// Copy the request's state header (or `none`) into the response's
/// state-response header. The gateway rejects responses that fail the
/// challenge.
pub async fn echo_state_header(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let challenge = req
        .headers()
        .get(&state.headers.state)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("none"));

    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert(state.headers.state_resp.clone(), challenge);
    resp
}
