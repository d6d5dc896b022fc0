//! Domain types shared across snooze crates.
//!
//! [`Route`] and [`App`] mirror the gateway and PaaS payloads. Both are
//! owned by their platforms: the orchestrator reads them and sends back
//! whole-object updates, so every struct keeps the JSON fields it does
//! not model in an `extra` map and re-emits them untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Gateway route identifier.
pub type RouteId = String;

/// PaaS application identifier.
pub type AppId = String;

/// Route metadata keys written and read by the orchestrator.
pub mod meta {
    /// `"true"` opts a route into idle suppression.
    pub const ENABLED: &str = "snooze.enabled";
    /// PaaS application backing the route.
    pub const APP_ID: &str = "snooze.appId";
    /// `"true"` while the route points at the waiting page.
    pub const WAITING: &str = "snooze.waiting";
    pub const SHUTDOWN_AT_MILLIS: &str = "snooze.shutdownAtMillis";
    pub const SHUTDOWN_AT: &str = "snooze.shutdownAt";
    pub const RESTART_AT_MILLIS: &str = "snooze.restartAtMillis";
    pub const RESTART_AT: &str = "snooze.restartAt";
    /// JSON-encoded targets stashed while diverted.
    pub const TARGETS: &str = "snooze.targets";
    pub const ROOT: &str = "snooze.root";
    pub const RETRIES: &str = "snooze.retries";
    pub const CALL_TIMEOUT: &str = "snooze.timeout";
    pub const GLOBAL_TIMEOUT: &str = "snooze.gtimeout";
    /// Comma-separated `HH:MM-HH:MM` windows during which the app must stay up.
    pub const UPTIME: &str = "snooze.uptime";
    /// IANA timezone overriding the configured one for uptime windows.
    pub const TIMEZONE: &str = "snooze.timezone";
}

// ── Gateway ────────────────────────────────────────────────────────

/// A gateway route: public endpoint → backend targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default)]
    pub client_config: ClientConfig,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Gateway fields the orchestrator does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_root() -> String {
    "/".to_string()
}

impl Route {
    /// Read a metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Whether the route opted into idle suppression.
    pub fn is_snooze_enabled(&self) -> bool {
        self.meta(meta::ENABLED) == Some("true")
    }

    /// Whether the route currently points at the waiting page.
    pub fn is_waiting(&self) -> bool {
        self.meta(meta::WAITING) == Some("true")
    }

    /// PaaS application id, if configured and non-empty.
    pub fn app_id(&self) -> Option<&str> {
        self.meta(meta::APP_ID).filter(|id| !id.trim().is_empty())
    }

    /// Epoch millis of the last suppression, if recorded.
    pub fn shutdown_at_millis(&self) -> Option<i64> {
        self.meta(meta::SHUTDOWN_AT_MILLIS)
            .and_then(|v| v.trim().parse().ok())
    }

    /// Epoch millis of the last restore (0 if never restored).
    pub fn restart_at_millis(&self) -> i64 {
        self.meta(meta::RESTART_AT_MILLIS)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Raw must-stay-up window spec.
    pub fn uptime_windows(&self) -> Option<&str> {
        self.meta(meta::UPTIME).filter(|s| !s.trim().is_empty())
    }

    /// Per-route timezone override.
    pub fn timezone(&self) -> Option<&str> {
        self.meta(meta::TIMEZONE).filter(|s| !s.trim().is_empty())
    }
}

/// A backend target of a route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub host: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_scheme() -> String {
    "https".to_string()
}

impl Target {
    pub fn new(host: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            scheme: scheme.into(),
            extra: Map::new(),
        }
    }

    /// `scheme://host` base URL.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// Per-route upstream call settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub call_timeout: u64,
    /// Overall timeout including retries, in milliseconds.
    #[serde(default = "default_timeout")]
    pub global_timeout: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_retries() -> u32 {
    1
}

fn default_timeout() -> u64 {
    30_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            call_timeout: default_timeout(),
            global_timeout: default_timeout(),
            extra: Map::new(),
        }
    }
}

// ── PaaS ───────────────────────────────────────────────────────────

/// A PaaS application as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: AppId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: AppStatus,
    #[serde(default)]
    pub instance: AppInstance,
}

/// Instance sizing of an application.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppInstance {
    #[serde(default)]
    pub min_instances: u32,
    #[serde(default)]
    pub min_flavor: Flavor,
}

/// Instance flavor and its hourly-unit price.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Flavor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

/// Lifecycle status reported by the PaaS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppStatus {
    /// The app is stopped.
    Down,
    /// The app is deploying.
    Booting,
    /// The app is running.
    Up,
    /// Any token the orchestrator does not understand.
    #[default]
    Unknown,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Down => "app-down",
            AppStatus::Booting => "app-booting",
            AppStatus::Up => "app-up",
            AppStatus::Unknown => "unknown",
        }
    }
}

impl From<&str> for AppStatus {
    fn from(token: &str) -> Self {
        match token {
            "SHOULD_BE_DOWN" | "app-down" => AppStatus::Down,
            "WANTS_TO_BE_UP" | "app-booting" => AppStatus::Booting,
            "SHOULD_BE_UP" | "app-up" => AppStatus::Up,
            _ => AppStatus::Unknown,
        }
    }
}

impl From<String> for AppStatus {
    fn from(token: String) -> Self {
        AppStatus::from(token.as_str())
    }
}

impl From<AppStatus> for String {
    fn from(status: AppStatus) -> Self {
        match status {
            AppStatus::Down => "SHOULD_BE_DOWN".to_string(),
            AppStatus::Booting => "WANTS_TO_BE_UP".to_string(),
            AppStatus::Up => "SHOULD_BE_UP".to_string(),
            AppStatus::Unknown => "UNKNOWN".to_string(),
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "id": "svc-1",
            "name": "api",
            "enabled": true,
            "domain": "example.com",
            "targets": [{ "host": "api.internal", "scheme": "http", "weight": 1 }],
            "root": "/",
            "clientConfig": { "retries": 3, "callTimeout": 1000, "globalTimeout": 2000, "maxErrors": 20 },
            "metadata": { "snooze.enabled": "true", "snooze.appId": "app_1" }
        });

        let route: Route = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(route.extra.get("domain"), Some(&serde_json::json!("example.com")));
        assert_eq!(route.client_config.retries, 3);
        assert!(route.is_snooze_enabled());
        assert_eq!(route.app_id(), Some("app_1"));

        let back = serde_json::to_value(&route).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn route_metadata_helpers_tolerate_garbage() {
        let mut route: Route = serde_json::from_value(serde_json::json!({ "id": "svc" })).unwrap();
        assert_eq!(route.restart_at_millis(), 0);
        assert_eq!(route.shutdown_at_millis(), None);
        assert!(!route.is_waiting());

        route.metadata.insert(meta::RESTART_AT_MILLIS.into(), "not-a-number".into());
        route.metadata.insert(meta::APP_ID.into(), "  ".into());
        assert_eq!(route.restart_at_millis(), 0);
        assert_eq!(route.app_id(), None);
    }

    #[test]
    fn app_status_maps_platform_tokens() {
        assert_eq!(AppStatus::from("SHOULD_BE_DOWN"), AppStatus::Down);
        assert_eq!(AppStatus::from("WANTS_TO_BE_UP"), AppStatus::Booting);
        assert_eq!(AppStatus::from("SHOULD_BE_UP"), AppStatus::Up);
        assert_eq!(AppStatus::from("app-up"), AppStatus::Up);
        assert_eq!(AppStatus::from("RESTARTING"), AppStatus::Unknown);
    }

    #[test]
    fn app_decodes_sizing() {
        let app: App = serde_json::from_value(serde_json::json!({
            "id": "app_1",
            "name": "api",
            "state": "SHOULD_BE_UP",
            "instance": { "minInstances": 2, "minFlavor": { "name": "S", "price": 0.3436 } }
        }))
        .unwrap();

        assert_eq!(app.state, AppStatus::Up);
        assert_eq!(app.instance.min_instances, 2);
        assert!((app.instance.min_flavor.price - 0.3436).abs() < f64::EPSILON);
    }
}
