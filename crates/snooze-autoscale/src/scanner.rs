//! Scanner — periodic scale-to-zero policy.
//!
//! Each scan lists every route and classifies the opted-in ones. Routes
//! inside a "must stay up" window are woken if their app is down; idle
//! routes whose app is up are diverted to the waiting page and their app
//! stopped. Every per-route check runs as a task on the control queue, so
//! the gateway and PaaS never see concurrent mutations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use snooze_core::config::ScanConfig;
use snooze_core::{AppStatus, Route};
use snooze_wake::{RequestCoalescer, WakeContext, divert_route};

use crate::window::{UptimeWindows, route_timezone};

/// Delay between the boot scan and the start of the regular interval.
pub const SETTLE_DELAY: Duration = Duration::from_secs(10);

/// A route restored within this many scan intervals is left alone.
pub const RESTART_GUARD_INTERVALS: u32 = 10;

/// Knobs for the scan policy.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    pub run_every: Duration,
    /// Traffic lookback window.
    pub lookback: Duration,
    pub dry_run: bool,
    pub excluded_signature: Option<String>,
    pub timezone: Tz,
}

impl ScanPolicy {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            run_every: config.run_every(),
            lookback: config.lookback(),
            dry_run: config.dry_run,
            excluded_signature: config.excluded_signature.clone().filter(|s| !s.is_empty()),
            timezone: config.timezone(),
        }
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            run_every: Duration::from_secs(60),
            lookback: Duration::from_secs(3600),
            dry_run: false,
            excluded_signature: None,
            timezone: Tz::UTC,
        }
    }
}

/// Why a route was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotEnabled,
    /// Already pointing at the waiting page.
    Diverted,
    RecentlyRestored,
    NoAppId,
}

/// What a scan does with one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Skip(SkipReason),
    /// Inside an uptime window: wake the app if it is down.
    KeepUp { app_id: String },
    /// Eligible: suppress if idle and up.
    CheckIdle { app_id: String },
}

/// Classify a route without touching any collaborator.
pub fn classify(route: &Route, now: DateTime<Utc>, policy: &ScanPolicy) -> RouteDecision {
    if !route.is_snooze_enabled() {
        return RouteDecision::Skip(SkipReason::NotEnabled);
    }
    let Some(app_id) = route.app_id().map(str::to_string) else {
        return RouteDecision::Skip(SkipReason::NoAppId);
    };

    if let Some(spec) = route.uptime_windows() {
        let tz = route_timezone(route.timezone(), policy.timezone);
        if UptimeWindows::parse(spec).is_active(now, tz) {
            return RouteDecision::KeepUp { app_id };
        }
    }

    if route.is_waiting() {
        return RouteDecision::Skip(SkipReason::Diverted);
    }

    let guard = policy.run_every.as_millis() as i64 * i64::from(RESTART_GUARD_INTERVALS);
    if route.restart_at_millis() >= now.timestamp_millis() - guard {
        return RouteDecision::Skip(SkipReason::RecentlyRestored);
    }

    RouteDecision::CheckIdle { app_id }
}

/// Result of an idle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Traffic seen in the lookback window.
    Busy,
    /// Idle, but the app is not up.
    NotUp,
    /// Dry run: would have been suppressed.
    WouldSuppress,
    Suppressed,
}

/// Counts from one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub routes: usize,
    pub skipped: usize,
    pub keep_up_checks: usize,
    pub idle_checks: usize,
}

/// Periodic policy driver.
pub struct Scanner {
    coalescer: Arc<RequestCoalescer>,
    policy: ScanPolicy,
}

impl Scanner {
    pub fn new(coalescer: Arc<RequestCoalescer>, policy: ScanPolicy) -> Self {
        Self { coalescer, policy }
    }

    fn ctx(&self) -> &Arc<WakeContext> {
        self.coalescer.context()
    }

    /// List routes and queue one check per eligible route.
    pub async fn scan_once(&self) -> anyhow::Result<ScanSummary> {
        let ctx = self.ctx();
        let routes = ctx.gateway.list_routes().await?;
        let now = ctx.clock.now();
        let mut summary = ScanSummary {
            routes: routes.len(),
            ..Default::default()
        };

        for route in routes {
            match classify(&route, now, &self.policy) {
                RouteDecision::Skip(reason) => {
                    if reason == SkipReason::NoAppId {
                        warn!(route_id = %route.id, name = %route.name, "no app id specified for route");
                    }
                    summary.skipped += 1;
                }
                RouteDecision::KeepUp { app_id } => {
                    summary.keep_up_checks += 1;
                    let coalescer = Arc::clone(&self.coalescer);
                    ctx.control.enqueue(move || async move {
                        keep_up(&coalescer, &route, &app_id).await.map(|_| ())
                    });
                }
                RouteDecision::CheckIdle { app_id } => {
                    summary.idle_checks += 1;
                    let task_ctx = Arc::clone(ctx);
                    let policy = self.policy.clone();
                    ctx.control.enqueue(move || async move {
                        check_idle(&task_ctx, &policy, &route, &app_id).await.map(|_| ())
                    });
                }
            }
        }

        debug!(?summary, "scan queued");
        Ok(summary)
    }

    async fn scan_logged(&self) {
        if let Err(e) = self.scan_once().await {
            error!(error = %e, "route scan failed");
        }
    }

    /// Scan now, then every `run_every` once the settle delay has passed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.policy.run_every.as_secs(),
            lookback_secs = self.policy.lookback.as_secs(),
            dry_run = self.policy.dry_run,
            "scan loop started"
        );
        self.scan_logged().await;

        let mut delay = SETTLE_DELAY + self.policy.run_every;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.scan_logged().await;
                    delay = self.policy.run_every;
                }
                _ = shutdown.changed() => {
                    info!("scan loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Wake a must-stay-up app that is down. Returns whether a wake began.
pub async fn keep_up(
    coalescer: &RequestCoalescer,
    route: &Route,
    app_id: &str,
) -> anyhow::Result<bool> {
    let app = coalescer.context().paas.get_app(app_id).await?;
    if app.state != AppStatus::Down {
        return Ok(false);
    }
    info!(route_id = %route.id, name = %route.name, "app down inside uptime window, waking");
    Ok(coalescer.ensure_tracked(&route.id))
}

/// Suppress a route if it saw no qualifying traffic and its app is up.
pub async fn check_idle(
    ctx: &WakeContext,
    policy: &ScanPolicy,
    route: &Route,
    app_id: &str,
) -> anyhow::Result<IdleOutcome> {
    let to = ctx.clock.now_millis();
    let from = to - policy.lookback.as_millis() as i64;
    let hits = ctx
        .gateway
        .count_traffic(&route.id, from, to, policy.excluded_signature.as_deref())
        .await?;
    if hits > 0 {
        debug!(route_id = %route.id, hits, "route is busy");
        return Ok(IdleOutcome::Busy);
    }

    ctx.remember_app_id(&route.id, app_id);
    let app = ctx.paas.get_app(app_id).await?;
    if app.state != AppStatus::Up {
        return Ok(IdleOutcome::NotUp);
    }

    info!(route_id = %route.id, name = %route.name, %app_id, "route is idle, app should be shut down");
    if policy.dry_run {
        return Ok(IdleOutcome::WouldSuppress);
    }

    let diverted = divert_route(route, &ctx.settings.self_target, ctx.clock.now())?;
    ctx.gateway.update_route(&diverted).await?;
    ctx.paas.stop_app(app_id).await?;
    ctx.notifier.notify(&format!(
        "App for service {} has been stopped. Next http request will start it on the fly",
        route.name
    ));
    Ok(IdleOutcome::Suppressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, route};
    use chrono::TimeZone;
    use serde_json::json;
    use snooze_core::meta;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn uptime_window_exempts_from_suppression() {
        let mut r = route("svc-1", "app_1");
        r.metadata.insert(meta::UPTIME.into(), "09:00-18:00".into());
        let policy = ScanPolicy::default();

        assert_eq!(
            classify(&r, at(10), &policy),
            RouteDecision::KeepUp { app_id: "app_1".into() }
        );
        assert_eq!(
            classify(&r, at(20), &policy),
            RouteDecision::CheckIdle { app_id: "app_1".into() }
        );
    }

    #[test]
    fn route_timezone_overrides_default() {
        let mut r = route("svc-1", "app_1");
        r.metadata.insert(meta::UPTIME.into(), "09:00-18:00".into());
        r.metadata.insert(meta::TIMEZONE.into(), "America/New_York".into());
        let policy = ScanPolicy::default();

        // 10:00 UTC is 05:00 in New York.
        assert!(matches!(classify(&r, at(10), &policy), RouteDecision::CheckIdle { .. }));
        // 15:00 UTC is 10:00 in New York.
        assert!(matches!(classify(&r, at(15), &policy), RouteDecision::KeepUp { .. }));
    }

    #[test]
    fn skips_disabled_diverted_and_recent_routes() {
        let policy = ScanPolicy::default();
        let now = at(12);

        let mut disabled = route("svc-1", "app_1");
        disabled.metadata.remove(meta::ENABLED);
        assert_eq!(classify(&disabled, now, &policy), RouteDecision::Skip(SkipReason::NotEnabled));

        let mut no_app = route("svc-1", "app_1");
        no_app.metadata.remove(meta::APP_ID);
        assert_eq!(classify(&no_app, now, &policy), RouteDecision::Skip(SkipReason::NoAppId));

        let mut diverted = route("svc-1", "app_1");
        diverted.metadata.insert(meta::WAITING.into(), "true".into());
        assert_eq!(classify(&diverted, now, &policy), RouteDecision::Skip(SkipReason::Diverted));

        // Guard is 10 x 60s.
        let mut recent = route("svc-1", "app_1");
        let nine_minutes_ago = now.timestamp_millis() - 9 * 60_000;
        recent.metadata.insert(meta::RESTART_AT_MILLIS.into(), nine_minutes_ago.to_string());
        assert_eq!(classify(&recent, now, &policy), RouteDecision::Skip(SkipReason::RecentlyRestored));

        let eleven_minutes_ago = now.timestamp_millis() - 11 * 60_000;
        recent.metadata.insert(meta::RESTART_AT_MILLIS.into(), eleven_minutes_ago.to_string());
        assert!(matches!(classify(&recent, now, &policy), RouteDecision::CheckIdle { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_route_is_diverted_then_stopped() {
        let h = harness();
        h.gateway.insert_route(route("svc-1", "app_1"));

        let outcome = check_idle(&h.ctx, &ScanPolicy::default(), &route("svc-1", "app_1"), "app_1")
            .await
            .unwrap();

        assert_eq!(outcome, IdleOutcome::Suppressed);
        let diverted = h.gateway.route("svc-1").unwrap();
        assert!(diverted.is_waiting());
        assert_eq!(diverted.root, "/waiting-page/svc-1/");
        assert_eq!(diverted.targets[0].host, "snooze.example.com");
        assert_eq!(h.paas.stop_count(), 1);
        assert_eq!(h.ctx.app_ids.get("svc-1").as_deref(), Some("app_1"));
        assert!(h.notifier.messages()[0].starts_with("App for service api has been stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_keeps_route_up() {
        let h = harness();
        h.gateway.insert_route(route("svc-1", "app_1"));
        h.gateway.set_events("svc-1", vec![json!({"@id": "evt-1"})]);

        let outcome = check_idle(&h.ctx, &ScanPolicy::default(), &route("svc-1", "app_1"), "app_1")
            .await
            .unwrap();

        assert_eq!(outcome, IdleOutcome::Busy);
        assert_eq!(h.gateway.update_count(), 0);
        assert_eq!(h.paas.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn excluded_signature_traffic_does_not_count() {
        let h = harness();
        h.gateway.insert_route(route("svc-1", "app_1"));
        h.gateway.set_events(
            "svc-1",
            vec![json!({"headers": {"User-Agent": "UptimeRobot/2.0"}})],
        );
        let policy = ScanPolicy {
            excluded_signature: Some("UptimeRobot".into()),
            ..ScanPolicy::default()
        };

        let outcome = check_idle(&h.ctx, &policy, &route("svc-1", "app_1"), "app_1")
            .await
            .unwrap();
        assert_eq!(outcome, IdleOutcome::Suppressed);
    }

    #[tokio::test(start_paused = true)]
    async fn real_traffic_behind_a_page_of_monitor_hits_keeps_route_up() {
        let h = harness();
        h.gateway.insert_route(route("svc-1", "app_1"));
        let mut events: Vec<_> = (0..120)
            .map(|i| json!({"@id": i, "headers": {"User-Agent": "UptimeRobot/2.0"}}))
            .collect();
        events.push(json!({"@id": "real", "headers": {"User-Agent": "curl/8.0"}}));
        h.gateway.set_events("svc-1", events);
        let policy = ScanPolicy {
            excluded_signature: Some("UptimeRobot".into()),
            ..ScanPolicy::default()
        };

        let outcome = check_idle(&h.ctx, &policy, &route("svc-1", "app_1"), "app_1")
            .await
            .unwrap();

        assert_eq!(outcome, IdleOutcome::Busy);
        assert_eq!(h.gateway.update_count(), 0);
        assert_eq!(h.paas.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_changes_nothing() {
        let h = harness();
        h.gateway.insert_route(route("svc-1", "app_1"));
        let policy = ScanPolicy {
            dry_run: true,
            ..ScanPolicy::default()
        };

        let outcome = check_idle(&h.ctx, &policy, &route("svc-1", "app_1"), "app_1")
            .await
            .unwrap();
        assert_eq!(outcome, IdleOutcome::WouldSuppress);
        assert_eq!(h.gateway.update_count(), 0);
        assert_eq!(h.paas.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_but_down_app_is_left_alone() {
        let h = harness();
        h.gateway.insert_route(route("svc-1", "app_1"));
        h.paas.set_status("app_1", AppStatus::Down);

        let outcome = check_idle(&h.ctx, &ScanPolicy::default(), &route("svc-1", "app_1"), "app_1")
            .await
            .unwrap();
        assert_eq!(outcome, IdleOutcome::NotUp);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_queues_checks_and_wakes_down_apps_in_window() {
        let h = harness();
        h.gateway.insert_route(route("svc-idle", "app_1"));

        let mut office = route("svc-office", "app_2");
        office.metadata.insert(meta::UPTIME.into(), "00:00-00:00".into());
        h.gateway.insert_route(office);
        h.add_app("app_2", AppStatus::Down);

        let mut other = route("svc-other", "app_3");
        other.metadata.remove(meta::ENABLED);
        h.gateway.insert_route(other);

        let scanner = Scanner::new(h.coalescer.clone(), ScanPolicy::default());
        let summary = scanner.scan_once().await.unwrap();
        assert_eq!(
            summary,
            ScanSummary {
                routes: 3,
                skipped: 1,
                keep_up_checks: 1,
                idle_checks: 1,
            }
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.gateway.route("svc-idle").unwrap().is_waiting());
        assert_eq!(h.paas.stop_count(), 1);
        assert!(h.ctx.state("svc-office").is_some());
    }
}
