//! Route diversion and restoration.
//!
//! Both functions are pure: they take the gateway's current copy of a
//! route and return the whole object to send back. Diversion stashes the
//! live targets, root and client settings in metadata; restoration reads
//! them back and clears the stash.

use chrono::{DateTime, Utc};

use snooze_core::{ClientConfig, Route, Target, meta};

use crate::error::RoutingError;

/// Path prefix served by the orchestrator for diverted routes.
pub const WAITING_PAGE_PREFIX: &str = "/waiting-page";

/// Upstream settings applied while a route points at the waiting page:
/// callers may be held for the whole wake deadline.
pub const DIVERTED_RETRIES: u32 = 10;
pub const DIVERTED_CALL_TIMEOUT_MS: u64 = 60_000;
pub const DIVERTED_GLOBAL_TIMEOUT_MS: u64 = 600_000;

/// Human-readable timestamp format stored next to the millis keys.
const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Root the gateway uses for a diverted route.
pub fn waiting_root(route_id: &str) -> String {
    format!("{WAITING_PAGE_PREFIX}/{route_id}/")
}

/// Point a route at the orchestrator's waiting page.
pub fn divert_route(
    route: &Route,
    self_target: &Target,
    now: DateTime<Utc>,
) -> Result<Route, RoutingError> {
    let stashed_targets =
        serde_json::to_string(&route.targets).map_err(|e| RoutingError::Serialize(e.to_string()))?;

    let mut diverted = route.clone();
    let metadata = &mut diverted.metadata;
    metadata.remove(meta::RESTART_AT);
    metadata.remove(meta::RESTART_AT_MILLIS);
    metadata.insert(meta::SHUTDOWN_AT_MILLIS.into(), now.timestamp_millis().to_string());
    metadata.insert(meta::SHUTDOWN_AT.into(), now.format(DISPLAY_FORMAT).to_string());
    metadata.insert(meta::TARGETS.into(), stashed_targets);
    metadata.insert(meta::ROOT.into(), route.root.clone());
    metadata.insert(meta::RETRIES.into(), route.client_config.retries.to_string());
    metadata.insert(meta::CALL_TIMEOUT.into(), route.client_config.call_timeout.to_string());
    metadata.insert(meta::GLOBAL_TIMEOUT.into(), route.client_config.global_timeout.to_string());
    metadata.insert(meta::WAITING.into(), "true".into());

    diverted.targets = vec![Target::new(&self_target.host, &self_target.scheme)];
    diverted.root = waiting_root(&route.id);
    diverted.client_config = ClientConfig {
        retries: DIVERTED_RETRIES,
        call_timeout: DIVERTED_CALL_TIMEOUT_MS,
        global_timeout: DIVERTED_GLOBAL_TIMEOUT_MS,
        extra: route.client_config.extra.clone(),
    };
    Ok(diverted)
}

/// Put a diverted route back on its stashed targets.
///
/// Missing retry and timeout stashes fall back to the gateway defaults;
/// missing or malformed targets are an error, since there is nothing
/// sensible to route to.
pub fn restore_route(route: &Route, now: DateTime<Utc>) -> Result<Route, RoutingError> {
    let raw_targets = route.meta(meta::TARGETS).ok_or_else(|| RoutingError::MissingStash {
        route_id: route.id.clone(),
        key: meta::TARGETS,
    })?;
    let targets: Vec<Target> =
        serde_json::from_str(raw_targets).map_err(|e| RoutingError::MalformedStash {
            route_id: route.id.clone(),
            key: meta::TARGETS,
            reason: e.to_string(),
        })?;

    let defaults = ClientConfig::default();
    let stashed = |key: &str| route.meta(key).and_then(|v| v.trim().parse::<u64>().ok());

    let mut restored = route.clone();
    restored.targets = targets;
    restored.root = route.meta(meta::ROOT).unwrap_or("/").to_string();
    restored.client_config = ClientConfig {
        retries: stashed(meta::RETRIES)
            .and_then(|r| u32::try_from(r).ok())
            .unwrap_or(defaults.retries),
        call_timeout: stashed(meta::CALL_TIMEOUT).unwrap_or(defaults.call_timeout),
        global_timeout: stashed(meta::GLOBAL_TIMEOUT).unwrap_or(defaults.global_timeout),
        extra: route.client_config.extra.clone(),
    };

    let metadata = &mut restored.metadata;
    for key in [
        meta::TARGETS,
        meta::ROOT,
        meta::RETRIES,
        meta::CALL_TIMEOUT,
        meta::GLOBAL_TIMEOUT,
        meta::SHUTDOWN_AT,
        meta::SHUTDOWN_AT_MILLIS,
    ] {
        metadata.remove(key);
    }
    metadata.insert(meta::RESTART_AT_MILLIS.into(), now.timestamp_millis().to_string());
    metadata.insert(meta::RESTART_AT.into(), now.format(DISPLAY_FORMAT).to_string());
    metadata.insert(meta::WAITING.into(), "false".into());
    Ok(restored)
}
