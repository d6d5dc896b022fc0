//! Candidate report: enabled routes that have not opted in yet and saw
//! no traffic in the lookback window.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use snooze_wake::WakeContext;

use crate::periodic;

/// Pause between traffic queries, to spare the gateway.
pub const QUERY_SPACING: Duration = Duration::from_millis(300);

/// Delay before the first candidate report after boot.
pub const FIRST_CANDIDATES_DELAY: Duration = Duration::from_secs(20);

/// A route worth opting in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub route_id: String,
    pub name: String,
}

/// Query traffic for every enabled, not-yet-opted-in route, one at a
/// time. Routes whose traffic cannot be read are skipped.
pub async fn compute_candidates(
    ctx: &WakeContext,
    lookback: Duration,
    excluded_signature: Option<&str>,
) -> anyhow::Result<Vec<Candidate>> {
    let routes = ctx.gateway.list_routes().await?;
    let pending: Vec<_> = routes
        .into_iter()
        .filter(|r| r.enabled && !r.is_snooze_enabled())
        .collect();

    let mut candidates = Vec::new();
    for (i, route) in pending.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(QUERY_SPACING).await;
        }
        let to = ctx.clock.now_millis();
        let from = to - lookback.as_millis() as i64;
        match ctx
            .gateway
            .count_traffic(&route.id, from, to, excluded_signature)
            .await
        {
            Ok(0) => candidates.push(Candidate {
                route_id: route.id.clone(),
                name: route.name.clone(),
            }),
            Ok(hits) => debug!(route_id = %route.id, hits, "route has traffic"),
            Err(e) => warn!(route_id = %route.id, error = %e, "cannot read route traffic"),
        }
    }
    Ok(candidates)
}

/// Chat message listing candidates, or `None` when there are none.
pub fn candidates_message(candidates: &[Candidate]) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    let list = candidates
        .iter()
        .map(|c| format!(" * {}", c.name))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!(
        "Good candidates ({}) for snooze are : \n\n{list}",
        candidates.len()
    ))
}

/// Compute candidates and notify when any were found.
pub async fn announce_candidates(
    ctx: &WakeContext,
    lookback: Duration,
    excluded_signature: Option<&str>,
) -> anyhow::Result<Vec<Candidate>> {
    let candidates = compute_candidates(ctx, lookback, excluded_signature).await?;
    if let Some(message) = candidates_message(&candidates) {
        ctx.notifier.notify(&message);
    }
    Ok(candidates)
}

/// Announce candidates after the boot delay, then every `every`.
pub async fn run_candidates(
    ctx: Arc<WakeContext>,
    lookback: Duration,
    excluded_signature: Option<String>,
    every: Duration,
    shutdown: watch::Receiver<bool>,
) {
    periodic::run("candidate report", FIRST_CANDIDATES_DELAY, every, shutdown, move || {
        let ctx = Arc::clone(&ctx);
        let excluded = excluded_signature.clone();
        async move {
            if let Err(e) = announce_candidates(&ctx, lookback, excluded.as_deref()).await {
                error!(error = %e, "candidate report failed");
            }
        }
    })
    .await;
}
