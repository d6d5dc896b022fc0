//! In-memory collaborators.
//!
//! Scriptable stand-ins for the gateway, the PaaS and the chat sink, used
//! by the test suites and for local dry runs without credentials.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use snooze_core::{App, AppStatus, Route};

use crate::error::{ClientError, ClientResult};
use crate::gateway::GatewayApi;
use crate::notify::Notifier;
use crate::paas::PaasApi;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take one unit from a failure budget. Returns whether the call should fail.
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ── Gateway ────────────────────────────────────────────────────────

/// Gateway double holding routes, events and templates in memory.
#[derive(Default)]
pub struct InMemoryGateway {
    routes: Mutex<BTreeMap<String, Route>>,
    events: Mutex<HashMap<String, Vec<Value>>>,
    templates: Mutex<HashMap<String, String>>,
    updates: Mutex<Vec<Route>>,
    failing_updates: AtomicUsize,
    failing_reads: AtomicUsize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let gateway = Self::new();
        for route in routes {
            gateway.insert_route(route);
        }
        gateway
    }

    pub fn insert_route(&self, route: Route) {
        lock(&self.routes).insert(route.id.clone(), route);
    }

    /// Current copy of a route.
    pub fn route(&self, route_id: &str) -> Option<Route> {
        lock(&self.routes).get(route_id).cloned()
    }

    pub fn set_events(&self, route_id: &str, events: Vec<Value>) {
        lock(&self.events).insert(route_id.to_string(), events);
    }

    pub fn set_template(&self, route_id: &str, template: &str) {
        lock(&self.templates).insert(route_id.to_string(), template.to_string());
    }

    /// Every route passed to `update_route` that was accepted.
    pub fn updates(&self) -> Vec<Route> {
        lock(&self.updates).clone()
    }

    pub fn update_count(&self) -> usize {
        lock(&self.updates).len()
    }

    /// Make the next `n` route updates fail with a 502.
    pub fn fail_next_updates(&self, n: usize) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` route reads fail with a 502.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl GatewayApi for InMemoryGateway {
    async fn list_routes(&self) -> ClientResult<Vec<Route>> {
        Ok(lock(&self.routes).values().cloned().collect())
    }

    async fn get_route(&self, route_id: &str) -> ClientResult<Route> {
        if take_failure(&self.failing_reads) {
            return Err(ClientError::Status {
                op: "get route",
                status: 502,
            });
        }
        self.route(route_id)
            .ok_or_else(|| ClientError::NotFound(format!("route {route_id}")))
    }

    async fn update_route(&self, route: &Route) -> ClientResult<Route> {
        if take_failure(&self.failing_updates) {
            return Err(ClientError::Status {
                op: "update route",
                status: 502,
            });
        }
        let mut routes = lock(&self.routes);
        if !routes.contains_key(&route.id) {
            return Err(ClientError::NotFound(format!("route {}", route.id)));
        }
        routes.insert(route.id.clone(), route.clone());
        lock(&self.updates).push(route.clone());
        Ok(route.clone())
    }

    async fn traffic_events(
        &self,
        route_id: &str,
        _from_millis: i64,
        _to_millis: i64,
        page: u32,
        page_size: u32,
    ) -> ClientResult<Vec<Value>> {
        let skip = page.saturating_sub(1) as usize * page_size as usize;
        let events = lock(&self.events).get(route_id).cloned().unwrap_or_default();
        Ok(events
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect())
    }

    async fn waiting_template(&self, route_id: &str) -> ClientResult<String> {
        lock(&self.templates)
            .get(route_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("template {route_id}")))
    }
}

// ── PaaS ───────────────────────────────────────────────────────────

/// PaaS double. Each app either follows a scripted status sequence (the
/// last status repeats once the script runs out) or reacts to start and
/// stop commands directly.
#[derive(Default)]
pub struct InMemoryPaas {
    apps: Mutex<HashMap<String, App>>,
    scripts: Mutex<HashMap<String, VecDeque<AppStatus>>>,
    starts: Mutex<Vec<String>>,
    stops: Mutex<Vec<String>>,
    failing_starts: AtomicUsize,
    failing_gets: AtomicUsize,
}

impl InMemoryPaas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_app(&self, app: App) {
        lock(&self.apps).insert(app.id.clone(), app);
    }

    /// Statuses returned by successive `get_app` calls for `app_id`.
    pub fn script(&self, app_id: &str, statuses: impl IntoIterator<Item = AppStatus>) {
        lock(&self.scripts).insert(app_id.to_string(), statuses.into_iter().collect());
    }

    pub fn set_status(&self, app_id: &str, status: AppStatus) {
        if let Some(app) = lock(&self.apps).get_mut(app_id) {
            app.state = status;
        }
    }

    pub fn start_count(&self) -> usize {
        lock(&self.starts).len()
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.stops).len()
    }

    pub fn fail_next_starts(&self, n: usize) {
        self.failing_starts.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    fn next_scripted(&self, app_id: &str) -> Option<AppStatus> {
        let mut scripts = lock(&self.scripts);
        let script = scripts.get_mut(app_id)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl PaasApi for InMemoryPaas {
    async fn get_app(&self, app_id: &str) -> ClientResult<App> {
        if take_failure(&self.failing_gets) {
            return Err(ClientError::Status {
                op: "get app",
                status: 503,
            });
        }
        let mut app = lock(&self.apps)
            .get(app_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("app {app_id}")))?;
        if let Some(status) = self.next_scripted(app_id) {
            app.state = status;
        }
        Ok(app)
    }

    async fn start_app(&self, app_id: &str, _commit: Option<&str>) -> ClientResult<()> {
        if take_failure(&self.failing_starts) {
            return Err(ClientError::Status {
                op: "start app",
                status: 500,
            });
        }
        lock(&self.starts).push(app_id.to_string());
        self.set_status(app_id, AppStatus::Up);
        Ok(())
    }

    async fn stop_app(&self, app_id: &str) -> ClientResult<()> {
        lock(&self.stops).push(app_id.to_string());
        self.set_status(app_id, AppStatus::Down);
        Ok(())
    }
}

// ── Notifications ──────────────────────────────────────────────────

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}
