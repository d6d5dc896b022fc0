//! WakeContext — everything the wake path and the scan loop share.

use std::sync::Arc;
use std::time::Duration;

use snooze_clients::{GatewayApi, Notifier, PaasApi};
use snooze_core::{Clock, ReleaseMode, SnoozeConfig, Target};
use snooze_scheduler::TaskQueue;
use snooze_state::{SavingsLedger, TtlCache};

use crate::state::WakeState;

/// How long a route → app id resolution is cached.
pub const APP_ID_TTL: Duration = Duration::from_secs(5 * 60);

/// How long a rendered waiting page is cached.
pub const TEMPLATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Timing and addressing knobs for the wake path.
#[derive(Debug, Clone)]
pub struct WakeSettings {
    /// TTL renewed on every state transition.
    pub state_ttl: Duration,
    /// Delay between deployment status polls.
    pub poll_interval: Duration,
    /// Absolute deadline for coalesced waiters, from first attach.
    pub deadline: Duration,
    /// How often waiters check for READY.
    pub check_interval: Duration,
    /// Grace delay between READY and releasing waiters.
    pub release_delay: Duration,
    /// Where diverted routes point.
    pub self_target: Target,
    pub release_mode: ReleaseMode,
}

impl WakeSettings {
    pub fn new(self_target: Target) -> Self {
        Self {
            state_ttl: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            deadline: Duration::from_secs(600),
            check_interval: Duration::from_secs(2),
            release_delay: Duration::from_secs(4),
            self_target,
            release_mode: ReleaseMode::Redirect,
        }
    }

    pub fn from_config(config: &SnoozeConfig) -> Self {
        let target = Target::new(&config.server.self_host, &config.server.self_scheme);
        Self {
            state_ttl: config.wake.state_ttl(),
            poll_interval: config.wake.poll_interval(),
            deadline: config.wake.deadline(),
            release_delay: config.wake.release_delay(),
            release_mode: config.wake.release_mode,
            ..Self::new(target)
        }
    }
}

/// Shared orchestrator state: caches, both task queues and the
/// collaborators. Handlers and loops hold it by `Arc`.
pub struct WakeContext {
    /// Per-service wake state; absence means untracked.
    pub states: TtlCache<WakeState>,
    /// Route id → PaaS app id.
    pub app_ids: TtlCache<String>,
    /// Route id → rendered waiting page.
    pub templates: TtlCache<String>,
    /// Route updates, start/stop commands and ledger writes.
    pub control: TaskQueue,
    /// Deployment status polls.
    pub poll: TaskQueue,
    pub gateway: Arc<dyn GatewayApi>,
    pub paas: Arc<dyn PaasApi>,
    pub notifier: Arc<dyn Notifier>,
    pub ledger: Option<SavingsLedger>,
    pub clock: Arc<dyn Clock>,
    pub settings: WakeSettings,
}

impl WakeContext {
    /// Build a context. Must be called inside a tokio runtime: the caches
    /// and queues spawn their background tasks here.
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        paas: Arc<dyn PaasApi>,
        notifier: Arc<dyn Notifier>,
        ledger: Option<SavingsLedger>,
        clock: Arc<dyn Clock>,
        settings: WakeSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            states: TtlCache::new("wake-states", settings.state_ttl),
            app_ids: TtlCache::new("app-ids", APP_ID_TTL),
            templates: TtlCache::new("templates", TEMPLATE_TTL),
            control: TaskQueue::new("control"),
            poll: TaskQueue::new("poll"),
            gateway,
            paas,
            notifier,
            ledger,
            clock,
            settings,
        })
    }

    /// Persist a state with a renewed TTL.
    pub fn set_state(&self, route_id: &str, state: WakeState) {
        self.states.set(route_id, state, self.settings.state_ttl);
    }

    pub fn state(&self, route_id: &str) -> Option<WakeState> {
        self.states.get(route_id)
    }

    /// Resolve the app backing a route, caching the answer.
    ///
    /// Returns `None` when the route carries no app id or the gateway
    /// cannot be reached; neither outcome is cached.
    pub async fn app_id_for(&self, route_id: &str) -> Option<String> {
        let app_id = self
            .app_ids
            .get_or_populate(
                route_id,
                || async {
                    let route = self.gateway.get_route(route_id).await?;
                    route
                        .app_id()
                        .map(str::to_string)
                        .ok_or_else(|| anyhow::anyhow!("route has no app id"))
                },
                |_| String::new(),
            )
            .await;
        Some(app_id).filter(|id| !id.is_empty())
    }

    /// Remember a route's app id, as seen during a scan.
    pub fn remember_app_id(&self, route_id: &str, app_id: &str) {
        self.app_ids.set(route_id, app_id.to_string(), APP_ID_TTL);
    }

    /// Stop every background task owned by the context.
    pub fn shutdown(&self) {
        self.control.shutdown();
        self.poll.shutdown();
        self.states.stop();
        self.app_ids.stop();
        self.templates.stop();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use snooze_clients::memory::{InMemoryGateway, InMemoryPaas, RecordingNotifier};
    use snooze_core::{App, AppInstance, AppStatus, Flavor, ManualClock, Route};

    pub struct Harness {
        pub ctx: Arc<WakeContext>,
        pub gateway: Arc<InMemoryGateway>,
        pub paas: Arc<InMemoryPaas>,
        pub notifier: Arc<RecordingNotifier>,
        pub clock: Arc<ManualClock>,
    }

    pub const SHUTDOWN_MILLIS: i64 = 1_700_000_000_000;

    /// A route diverted 65 minutes before the clock's start, backed by a
    /// 1-instance app at price 10.
    pub fn harness() -> Harness {
        harness_with(|_| {})
    }

    /// Like [`harness`], with the wake settings adjusted by `configure`.
    pub fn harness_with(configure: impl FnOnce(&mut WakeSettings)) -> Harness {
        let gateway = Arc::new(InMemoryGateway::new());
        let paas = Arc::new(InMemoryPaas::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(SHUTDOWN_MILLIS + 65 * 60_000));

        let me = Target::new("snooze.example.com", "https");
        let live: Route = serde_json::from_value(serde_json::json!({
            "id": "svc-1",
            "name": "api",
            "targets": [{ "host": "app-1.cleverapps.io", "scheme": "https" }],
            "metadata": { "snooze.enabled": "true", "snooze.appId": "app_1" }
        }))
        .unwrap();
        let shutdown_at = chrono::DateTime::from_timestamp_millis(SHUTDOWN_MILLIS).unwrap();
        gateway.insert_route(crate::routing::divert_route(&live, &me, shutdown_at).unwrap());

        paas.insert_app(App {
            id: "app_1".into(),
            name: "api".into(),
            state: AppStatus::Down,
            instance: AppInstance {
                min_instances: 1,
                min_flavor: Flavor {
                    name: "S".into(),
                    price: 10.0,
                },
            },
        });

        let mut settings = WakeSettings::new(me);
        configure(&mut settings);
        let ctx = WakeContext::new(
            gateway.clone(),
            paas.clone(),
            notifier.clone(),
            Some(SavingsLedger::open_in_memory().unwrap()),
            clock.clone(),
            settings,
        );
        Harness {
            ctx,
            gateway,
            paas,
            notifier,
            clock,
        }
    }
}
