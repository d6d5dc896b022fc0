//! Savings reports.
//!
//! Current savings come from routes diverted right now, priced from the
//! app sizing and the stashed shutdown timestamp. Past savings come from
//! the ledger, when one is configured.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, warn};

use snooze_state::SavingsRecord;
use snooze_state::savings::{round5, saved_since};
use snooze_wake::WakeContext;

use crate::periodic;

/// Delay before the first report after boot.
pub const FIRST_REPORT_DELAY: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsTotal {
    pub current: f64,
    pub past: f64,
    pub total: f64,
}

/// Saving accrued by a route that is suppressed right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSaving {
    pub name: String,
    pub service_id: String,
    pub app_id: String,
    pub saved: f64,
}

/// Body of `GET /api/savings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsReport {
    pub total: SavingsTotal,
    pub current_savings: Vec<CurrentSaving>,
    pub past_savings: Vec<SavingsRecord>,
}

/// Build the savings report. Routes whose app cannot be priced are
/// skipped rather than failing the whole report.
pub async fn compute_savings(ctx: &WakeContext) -> anyhow::Result<SavingsReport> {
    let routes = ctx.gateway.list_routes().await?;
    let now = ctx.clock.now_millis();

    let mut current_savings = Vec::new();
    for route in routes
        .iter()
        .filter(|r| r.is_snooze_enabled() && r.is_waiting())
    {
        let Some(app_id) = route.app_id() else {
            continue;
        };
        let app = match ctx.paas.get_app(app_id).await {
            Ok(app) => app,
            Err(e) => {
                warn!(route_id = %route.id, %app_id, error = %e, "cannot price suppressed app");
                continue;
            }
        };
        let shutdown_at = route.shutdown_at_millis().unwrap_or(now);
        current_savings.push(CurrentSaving {
            name: route.name.clone(),
            service_id: route.id.clone(),
            app_id: app_id.to_string(),
            saved: saved_since(
                now,
                shutdown_at,
                app.instance.min_instances,
                app.instance.min_flavor.price,
            ),
        });
    }

    let (past, past_savings) = match &ctx.ledger {
        Some(ledger) => (ledger.past_total()?, ledger.list()?),
        None => (0.0, Vec::new()),
    };
    let current = round5(current_savings.iter().fold(0.0, |acc, s| acc + s.saved));

    Ok(SavingsReport {
        total: SavingsTotal {
            current,
            past,
            total: round5(current + past),
        },
        current_savings,
        past_savings,
    })
}

/// Compute the report and send its total as a notification.
pub async fn announce_savings(ctx: &WakeContext) -> anyhow::Result<SavingsReport> {
    let report = compute_savings(ctx).await?;
    ctx.notifier
        .notify(&format!("Current savings are: {:.5} €", report.total.total));
    Ok(report)
}

/// Announce savings after the boot delay, then every `every`.
pub async fn run_reports(ctx: Arc<WakeContext>, every: Duration, shutdown: watch::Receiver<bool>) {
    periodic::run("savings report", FIRST_REPORT_DELAY, every, shutdown, move || {
        let ctx = Arc::clone(&ctx);
        async move {
            if let Err(e) = announce_savings(&ctx).await {
                error!(error = %e, "savings report failed");
            }
        }
    })
    .await;
}
