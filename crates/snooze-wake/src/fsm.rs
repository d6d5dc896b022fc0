//! DeploymentFsm — drives one service from DOWN to READY.
//!
//! Each poll reads the app status, applies one transition, persists the
//! new state with a renewed TTL and schedules the next poll on the poll
//! queue. There is no retry counter: a failed start or restore simply
//! leaves the state where the next poll will try again.
//!
//! ```text
//! DOWN ──start ok──▶ STARTING ──app up──▶ ROUTING ──route restored──▶ READY
//!   ▲                                       │ restore failed: retry
//!   └──────── unexpected status ────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use snooze_core::{AppStatus, Route};
use snooze_state::savings;

use crate::context::WakeContext;
use crate::routing::restore_route;
use crate::state::WakeState;

/// A boxed poll, as queued on the poll queue.
pub type PollFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Deployment state machine bound to a context.
#[derive(Clone)]
pub struct DeploymentFsm {
    ctx: Arc<WakeContext>,
}

impl DeploymentFsm {
    pub fn new(ctx: Arc<WakeContext>) -> Self {
        Self { ctx }
    }

    /// Queue a poll to run as soon as the poll queue gets to it.
    pub fn schedule(&self, route_id: &str, app_id: &str) {
        let fsm = self.clone();
        let (route_id, app_id) = (route_id.to_string(), app_id.to_string());
        self.ctx.poll.enqueue(move || fsm.poll(route_id, app_id));
    }

    fn schedule_next(&self, route_id: &str, app_id: &str) {
        let fsm = self.clone();
        let (route_id, app_id) = (route_id.to_string(), app_id.to_string());
        self.ctx
            .poll
            .enqueue_in(self.ctx.settings.poll_interval, move || fsm.poll(route_id, app_id));
    }

    fn poll(self, route_id: String, app_id: String) -> PollFuture {
        Box::pin(async move {
            self.step(&route_id, &app_id).await;
            Ok(())
        })
    }

    /// Apply one transition. Returns the persisted state, or `None` once
    /// the service is READY and polling stops.
    pub async fn step(&self, route_id: &str, app_id: &str) -> Option<WakeState> {
        let ctx = &self.ctx;
        let status = match ctx.paas.get_app(app_id).await {
            Ok(app) => app.state,
            Err(e) => {
                warn!(%route_id, %app_id, error = %e, "app status unavailable");
                AppStatus::Unknown
            }
        };
        let current = ctx.state(route_id);
        debug!(%route_id, %app_id, ?current, %status, "checking deployment");

        let next = match (current, status) {
            (_, AppStatus::Booting) => WakeState::Starting,
            (Some(WakeState::Down), AppStatus::Down) => {
                match ctx.paas.start_app(app_id, None).await {
                    Ok(()) => {
                        info!(%route_id, %app_id, "app start issued");
                        WakeState::Starting
                    }
                    Err(e) => {
                        warn!(%route_id, %app_id, error = %e, "app start failed");
                        WakeState::Down
                    }
                }
            }
            (Some(WakeState::Ready), AppStatus::Up) => {
                info!(%route_id, %app_id, "wake complete");
                return None;
            }
            (Some(WakeState::Down | WakeState::Starting), AppStatus::Up) => {
                ctx.set_state(route_id, WakeState::Routing);
                match self.restore(route_id, app_id).await {
                    Ok(true) => WakeState::Routing,
                    // Not diverted: the app was already serving.
                    Ok(false) => WakeState::Ready,
                    Err(e) => {
                        warn!(%route_id, error = %e, "route restore failed");
                        WakeState::Routing
                    }
                }
            }
            (Some(WakeState::Routing), AppStatus::Up) => {
                match self.restore(route_id, app_id).await {
                    Ok(true) => WakeState::Routing,
                    Ok(false) => WakeState::Ready,
                    Err(e) => {
                        warn!(%route_id, error = %e, "route restore retry failed");
                        WakeState::Routing
                    }
                }
            }
            _ => WakeState::Down,
        };

        if current != Some(next) {
            info!(%route_id, from = ?current, to = %next, "wake state changed");
        }
        ctx.set_state(route_id, next);
        self.schedule_next(route_id, app_id);
        Some(next)
    }

    /// Put the route back on its app if it is still diverted. Returns
    /// whether an update was issued; `false` means nothing was left to do.
    async fn restore(&self, route_id: &str, app_id: &str) -> anyhow::Result<bool> {
        let ctx = &self.ctx;
        let route = ctx.gateway.get_route(route_id).await?;
        if !route.is_waiting() {
            return Ok(false);
        }

        let restored = restore_route(&route, ctx.clock.now())?;
        ctx.gateway.update_route(&restored).await?;
        info!(%route_id, name = %route.name, "route restored");
        ctx.notifier
            .notify(&format!("App for service {} is now up.", route.name));

        let ctx = Arc::clone(ctx);
        let app_id = app_id.to_string();
        self.ctx.control.enqueue(move || async move {
            record_savings(&ctx, &route, &app_id).await.map(|_| ())
        });
        Ok(true)
    }
}

/// Credit the savings of a suppression that just ended. `route` is the
/// diverted copy, still carrying its shutdown timestamp.
pub async fn record_savings(ctx: &WakeContext, route: &Route, app_id: &str) -> anyhow::Result<f64> {
    let app = ctx.paas.get_app(app_id).await?;
    let now = ctx.clock.now_millis();
    let shutdown_at = route.shutdown_at_millis().unwrap_or(now);
    let saved = savings::saved_since(
        now,
        shutdown_at,
        app.instance.min_instances,
        app.instance.min_flavor.price,
    );

    ctx.notifier
        .notify(&format!("Saved at least {saved} € for service {}", route.name));
    if let Some(ledger) = &ctx.ledger {
        ledger.record(&route.id, app_id, &route.name, saved)?;
    }
    debug!(route_id = %route.id, %app_id, saved, "savings recorded");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::harness;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn down_booting_up_reaches_ready_with_one_restore() {
        let h = harness();
        h.paas.script("app_1", [AppStatus::Down, AppStatus::Booting, AppStatus::Up]);
        h.ctx.set_state("svc-1", WakeState::Down);
        let fsm = DeploymentFsm::new(h.ctx.clone());

        let mut seen = Vec::new();
        while let Some(state) = fsm.step("svc-1", "app_1").await {
            seen.push(state);
        }

        assert_eq!(
            seen,
            vec![
                WakeState::Starting,
                WakeState::Starting,
                WakeState::Routing,
                WakeState::Ready
            ]
        );
        assert_eq!(h.paas.start_count(), 1);
        assert_eq!(h.gateway.update_count(), 1);
        assert!(!h.gateway.route("svc-1").unwrap().is_waiting());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_stays_down_and_retries() {
        let h = harness();
        h.paas.script("app_1", [AppStatus::Down]);
        h.paas.fail_next_starts(1);
        h.ctx.set_state("svc-1", WakeState::Down);
        let fsm = DeploymentFsm::new(h.ctx.clone());

        assert_eq!(fsm.step("svc-1", "app_1").await, Some(WakeState::Down));
        assert_eq!(h.paas.start_count(), 0);
        assert_eq!(fsm.step("svc-1", "app_1").await, Some(WakeState::Starting));
        assert_eq!(h.paas.start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_status_degrades_to_down() {
        let h = harness();
        h.paas.fail_next_gets(1);
        h.ctx.set_state("svc-1", WakeState::Starting);
        let fsm = DeploymentFsm::new(h.ctx.clone());

        assert_eq!(fsm.step("svc-1", "app_1").await, Some(WakeState::Down));
        assert_eq!(h.ctx.state("svc-1"), Some(WakeState::Down));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restore_is_retried_from_routing() {
        let h = harness();
        h.paas.script("app_1", [AppStatus::Up]);
        h.gateway.fail_next_updates(1);
        h.ctx.set_state("svc-1", WakeState::Starting);
        let fsm = DeploymentFsm::new(h.ctx.clone());

        assert_eq!(fsm.step("svc-1", "app_1").await, Some(WakeState::Routing));
        assert_eq!(h.gateway.update_count(), 0);
        assert_eq!(fsm.step("svc-1", "app_1").await, Some(WakeState::Routing));
        assert_eq!(h.gateway.update_count(), 1);
        assert_eq!(fsm.step("svc-1", "app_1").await, Some(WakeState::Ready));
        assert_eq!(h.gateway.update_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_up_and_routed_skips_start() {
        let h = harness();
        let mut route = h.gateway.route("svc-1").unwrap();
        route.metadata.insert(snooze_core::meta::WAITING.into(), "false".into());
        h.gateway.insert_route(route);
        h.paas.script("app_1", [AppStatus::Up]);
        h.ctx.set_state("svc-1", WakeState::Down);
        let fsm = DeploymentFsm::new(h.ctx.clone());

        assert_eq!(fsm.step("svc-1", "app_1").await, Some(WakeState::Ready));
        assert_eq!(fsm.step("svc-1", "app_1").await, None);
        assert_eq!(h.paas.start_count(), 0);
        assert_eq!(h.gateway.update_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_chain_restores_and_records_savings() {
        let h = harness();
        h.paas.script("app_1", [AppStatus::Down, AppStatus::Booting, AppStatus::Up]);
        h.ctx.set_state("svc-1", WakeState::Down);
        DeploymentFsm::new(h.ctx.clone()).schedule("svc-1", "app_1");

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(h.ctx.state("svc-1"), Some(WakeState::Ready));
        let messages = h.notifier.messages();
        assert!(messages.contains(&"App for service api is now up.".to_string()));
        assert!(messages.contains(&"Saved at least 0.679 € for service api".to_string()));

        let ledger = h.ctx.ledger.as_ref().unwrap();
        assert_eq!(ledger.past_total().unwrap(), 0.679);
        assert_eq!(ledger.get("global", "global").unwrap().unwrap().saved, 0.679);
    }
}
