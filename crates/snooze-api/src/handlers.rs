//! HTTP handlers.
//!
//! The waiting-page handlers answer three kinds of callers on the same
//! URL: the page's own status polls, API clients that must wait for the
//! service, and browsers that get the waiting page.

use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde_json::json;
use snooze_core::ReleaseMode;
use tracing::{info, warn};

use crate::ApiState;
use crate::page::{self, STATUS_REQUEST};
use crate::proxy;

/// Body sent with the 307 that releases a waiting caller.
pub const RELEASED_MESSAGE: &str = "Your app has started, re-run the call ...";

pub const HEALTHY_MESSAGE: &str = "Yes, I'm healthy !!!";

fn error_response(msg: &str, status: StatusCode) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

// ── Waiting page ───────────────────────────────────────────────

/// ANY /waiting-page/{service_id}/
pub async fn waiting_root(
    State(state): State<ApiState>,
    Path(service_id): Path<String>,
    req: Request,
) -> Response {
    handle_waiting(state, service_id, req).await
}

/// ANY /waiting-page/{service_id}/{*rest}
pub async fn waiting_nested(
    State(state): State<ApiState>,
    Path((service_id, _rest)): Path<(String, String)>,
    req: Request,
) -> Response {
    handle_waiting(state, service_id, req).await
}

async fn handle_waiting(state: ApiState, service_id: String, req: Request) -> Response {
    let headers = &state.headers;
    let wants_status = req
        .headers()
        .get(&headers.status)
        .and_then(|v| v.to_str().ok())
        == Some(STATUS_REQUEST);

    if wants_status {
        let status = state.coalescer.status(&service_id);
        return (
            [(headers.status.clone(), "true")],
            Json(json!({ "status": status.label() })),
        )
            .into_response();
    }

    state.coalescer.ensure_tracked(&service_id);

    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");
    if accept.contains("html") {
        let ctx = state.coalescer.context();
        let page = page::waiting_page(ctx, &service_id, headers.status.as_str()).await;
        return Html(page).into_response();
    }

    if let Err(e) = state.coalescer.attach(&service_id).await {
        warn!(%service_id, error = %e, "releasing waiting call with an error");
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    match state.coalescer.context().settings.release_mode {
        ReleaseMode::Redirect => {
            let location = proxy::original_path(req.uri().path(), req.uri().query(), &service_id);
            info!(%service_id, %location, "call released");
            (
                StatusCode::TEMPORARY_REDIRECT,
                [(header::LOCATION, location)],
                Json(json!({ "redirect": RELEASED_MESSAGE })),
            )
                .into_response()
        }
        ReleaseMode::Proxy => release_by_proxy(&state, &service_id, req).await,
    }
}

async fn release_by_proxy(state: &ApiState, service_id: &str, req: Request) -> Response {
    let ctx = state.coalescer.context();
    let route = match ctx.gateway.get_route(service_id).await {
        Ok(route) => route,
        Err(e) => {
            warn!(%service_id, error = %e, "cannot load restored route");
            return error_response(&e.to_string(), StatusCode::BAD_GATEWAY);
        }
    };

    match proxy::forward(&state.http, &route, req).await {
        Ok(resp) => {
            info!(%service_id, status = resp.status().as_u16(), "call released through proxy");
            resp
        }
        Err(e) => {
            warn!(%service_id, error = %e, "proxying released call failed");
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY)
        }
    }
}

// ── Reports ────────────────────────────────────────────────────

/// GET /api/savings
pub async fn savings(State(state): State<ApiState>) -> Response {
    match snooze_autoscale::compute_savings(state.coalescer.context()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// GET /api/health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "healthy": true, "message": HEALTHY_MESSAGE }))
}
