//! Forwarding released requests to the restored backend.

use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::HeaderValue;
use axum::response::Response;
use snooze_core::Route;
use tracing::debug;

use crate::error::ApiError;

/// Largest request body buffered for forwarding.
pub const MAX_FORWARD_BODY: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// HTTP client for forwarding. Redirects are passed back to the caller.
pub fn forwarding_client() -> Result<reqwest::Client, ApiError> {
    Ok(reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// Map a waiting-page path back onto the service's own path space:
/// `/waiting-page/{id}/rest` becomes `/rest`. The query string is kept.
pub fn original_path(path: &str, query: Option<&str>, route_id: &str) -> String {
    let prefix = snooze_wake::waiting_root(route_id);
    let path = match path.strip_prefix(&prefix) {
        Some(rest) => format!("/{rest}"),
        None => path.to_string(),
    };
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path,
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Replay `req` against the route's first target and stream the answer
/// back.
pub async fn forward(client: &reqwest::Client, route: &Route, req: Request) -> Result<Response, ApiError> {
    let target = route
        .targets
        .first()
        .ok_or_else(|| ApiError::NoTarget(route.id.clone()))?;

    let (parts, body) = req.into_parts();
    let path = original_path(parts.uri.path(), parts.uri.query(), &route.id);
    let url = format!("{}{}", target.base_url(), path);

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);
    if let Ok(host) = HeaderValue::from_str(&target.host) {
        headers.insert(header::HOST, host);
    }

    let body = axum::body::to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| ApiError::Body(e.to_string()))?;

    debug!(service_id = %route.id, method = %parts.method, %url, "forwarding released request");
    let upstream = client
        .request(parts.method, &url)
        .headers(headers)
        .timeout(Duration::from_millis(route.client_config.global_timeout.max(1_000)))
        .body(body)
        .send()
        .await?;

    let mut builder = Response::builder().status(upstream.status());
    if let Some(out) = builder.headers_mut() {
        out.extend(upstream.headers().clone());
        strip_hop_by_hop(out);
    }
    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::Body(e.to_string()))
}
