//! snooze.toml configuration parser.
//!
//! The daemon reads an optional TOML file, then lets `SNOOZE_*`
//! environment variables override individual keys. Durations are human
//! strings (`"500ms"`, `"60s"`, `"5m"`, `"1h"`).

use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnoozeConfig {
    pub gateway: GatewayConfig,
    pub paas: PaasConfig,
    pub server: ServerConfig,
    pub scan: ScanConfig,
    pub wake: WakeConfig,
    pub notify: NotifyConfig,
    pub ledger: LedgerConfig,
}

/// Gateway admin API access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub url: String,
    /// `Host` header expected by the admin API.
    pub host: String,
    pub client_id: String,
    pub client_secret: String,
}

/// PaaS API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaasConfig {
    pub api_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub secret: String,
    pub organization: String,
}

impl Default for PaasConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.clever-cloud.com/v2".to_string(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            token: String::new(),
            secret: String::new(),
            organization: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Host the gateway should reach this process on while a route is diverted.
    pub self_host: String,
    pub self_scheme: String,
    /// Gateway state-challenge request header.
    pub state_header: String,
    /// Response header echoing the state challenge.
    pub state_resp_header: String,
    /// Header carrying the status sub-protocol marker.
    pub status_header: String,
    /// `build` disables every background loop.
    pub instance_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            self_host: String::new(),
            self_scheme: String::new(),
            state_header: "Otoroshi-State".to_string(),
            state_resp_header: "Otoroshi-State-Resp".to_string(),
            status_header: "X-Snooze".to_string(),
            instance_type: "none".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn is_build_instance(&self) -> bool {
        self.instance_type == "build"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub run_every: String,
    /// Traffic lookback window.
    pub time_without_request: String,
    pub report_every: String,
    /// Defaults to four lookback windows.
    pub candidates_every: Option<String>,
    pub dry_run: bool,
    /// Traffic events containing this string are not counted.
    pub excluded_signature: Option<String>,
    pub timezone: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            run_every: "60s".to_string(),
            time_without_request: "1h".to_string(),
            report_every: "4h".to_string(),
            candidates_every: None,
            dry_run: false,
            excluded_signature: None,
            timezone: "UTC".to_string(),
        }
    }
}

impl ScanConfig {
    pub fn run_every(&self) -> Duration {
        parse_duration(&self.run_every).unwrap_or(Duration::from_secs(60))
    }

    pub fn lookback(&self) -> Duration {
        parse_duration(&self.time_without_request).unwrap_or(Duration::from_secs(3600))
    }

    pub fn report_every(&self) -> Duration {
        parse_duration(&self.report_every).unwrap_or(Duration::from_secs(4 * 3600))
    }

    pub fn candidates_every(&self) -> Duration {
        self.candidates_every
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or_else(|| self.lookback() * 4)
    }

    /// Configured timezone, falling back to UTC when unparseable.
    pub fn timezone(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }
}

/// How deferred callers are released once their app is ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseMode {
    /// Answer `307` so the caller retries against the restored route.
    #[default]
    Redirect,
    /// Forward the original request to the restored target.
    Proxy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    pub release_mode: ReleaseMode,
    /// Hard deadline for coalesced callers.
    pub deadline: String,
    pub poll_interval: String,
    /// TTL of the per-service wake state, renewed on every transition.
    pub state_ttl: String,
    /// Grace period between READY and releasing callers.
    pub release_delay: String,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            release_mode: ReleaseMode::Redirect,
            deadline: "10m".to_string(),
            poll_interval: "2s".to_string(),
            state_ttl: "2m".to_string(),
            release_delay: "4s".to_string(),
        }
    }
}

impl WakeConfig {
    pub fn deadline(&self) -> Duration {
        parse_duration(&self.deadline).unwrap_or(Duration::from_secs(600))
    }

    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(2))
    }

    pub fn state_ttl(&self) -> Duration {
        parse_duration(&self.state_ttl).unwrap_or(Duration::from_secs(120))
    }

    pub fn release_delay(&self) -> Duration {
        parse_duration(&self.release_delay).unwrap_or(Duration::from_secs(4))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Chat webhook receiving notifications.
    pub chat_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// redb file for the savings ledger; no ledger when unset.
    pub path: Option<String>,
}

impl SnoozeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the file if given (defaults otherwise), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        debug!(file = ?path, "configuration loaded");
        Ok(config)
    }

    /// Override keys from `SNOOZE_*` variables provided by `lookup`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        set(&mut self.gateway.url, "SNOOZE_GATEWAY_URL");
        set(&mut self.gateway.host, "SNOOZE_GATEWAY_HOST");
        set(&mut self.gateway.client_id, "SNOOZE_GATEWAY_CLIENT_ID");
        set(&mut self.gateway.client_secret, "SNOOZE_GATEWAY_CLIENT_SECRET");
        set(&mut self.paas.api_url, "SNOOZE_PAAS_API_URL");
        set(&mut self.paas.consumer_key, "SNOOZE_PAAS_CONSUMER_KEY");
        set(&mut self.paas.consumer_secret, "SNOOZE_PAAS_CONSUMER_SECRET");
        set(&mut self.paas.token, "SNOOZE_PAAS_TOKEN");
        set(&mut self.paas.secret, "SNOOZE_PAAS_SECRET");
        set(&mut self.paas.organization, "SNOOZE_PAAS_ORGANIZATION");
        set(&mut self.server.self_host, "SNOOZE_SELF_HOST");
        set(&mut self.server.self_scheme, "SNOOZE_SELF_SCHEME");
        set(&mut self.server.instance_type, "SNOOZE_INSTANCE_TYPE");
        set(&mut self.scan.run_every, "SNOOZE_RUN_EVERY");
        set(&mut self.scan.time_without_request, "SNOOZE_TIME_WITHOUT_REQUEST");
        set(&mut self.scan.report_every, "SNOOZE_REPORT_EVERY");
        set(&mut self.scan.timezone, "SNOOZE_TIMEZONE");

        if let Some(port) = lookup("SNOOZE_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "SNOOZE_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(flag) = lookup("SNOOZE_DRY_RUN") {
            self.scan.dry_run = flag.trim() == "true";
        }
        if let Some(flag) = lookup("SNOOZE_PROXY_MODE") {
            self.wake.release_mode = if flag.trim() == "true" {
                ReleaseMode::Proxy
            } else {
                ReleaseMode::Redirect
            };
        }
        if let Some(signature) = lookup("SNOOZE_EXCLUDED_SIGNATURE") {
            self.scan.excluded_signature = Some(signature);
        }
        if let Some(url) = lookup("SNOOZE_CHAT_URL") {
            self.notify.chat_url = Some(url);
        }
        if let Some(path) = lookup("SNOOZE_LEDGER_PATH") {
            self.ledger.path = Some(path);
        }
        Ok(())
    }

    /// Check that every required key is present and every value parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("gateway.url", &self.gateway.url),
            ("gateway.host", &self.gateway.host),
            ("gateway.client_id", &self.gateway.client_id),
            ("gateway.client_secret", &self.gateway.client_secret),
            ("paas.consumer_key", &self.paas.consumer_key),
            ("paas.consumer_secret", &self.paas.consumer_secret),
            ("paas.token", &self.paas.token),
            ("paas.secret", &self.paas.secret),
            ("paas.organization", &self.paas.organization),
            ("server.self_host", &self.server.self_host),
            ("server.self_scheme", &self.server.self_scheme),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let durations = [
            ("scan.run_every", Some(&self.scan.run_every)),
            ("scan.time_without_request", Some(&self.scan.time_without_request)),
            ("scan.report_every", Some(&self.scan.report_every)),
            ("scan.candidates_every", self.scan.candidates_every.as_ref()),
            ("wake.deadline", Some(&self.wake.deadline)),
            ("wake.poll_interval", Some(&self.wake.poll_interval)),
            ("wake.state_ttl", Some(&self.wake.state_ttl)),
            ("wake.release_delay", Some(&self.wake.release_delay)),
        ];
        for (key, value) in durations {
            if let Some(value) = value
                && parse_duration(value).is_none()
            {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.clone(),
                });
            }
        }

        if self.scan.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::Invalid {
                key: "scan.timezone",
                value: self.scan.timezone.clone(),
            });
        }
        Ok(())
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> SnoozeConfig {
        toml::from_str(
            r#"
[gateway]
url = "http://gateway.internal:8080"
host = "gateway-api.internal"
client_id = "id"
client_secret = "secret"

[paas]
consumer_key = "ck"
consumer_secret = "cs"
token = "tok"
secret = "sec"
organization = "orga_1"

[server]
self_host = "snooze.internal"
self_scheme = "https"
"#,
        )
        .unwrap()
    }

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = complete();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scan.run_every(), Duration::from_secs(60));
        assert_eq!(config.scan.lookback(), Duration::from_secs(3600));
        assert_eq!(config.scan.candidates_every(), Duration::from_secs(4 * 3600));
        assert_eq!(config.wake.release_mode, ReleaseMode::Redirect);
        assert_eq!(config.wake.state_ttl(), Duration::from_secs(120));
        assert_eq!(config.paas.api_url, "https://api.clever-cloud.com/v2");
        config.validate().unwrap();
    }

    #[test]
    fn validate_lists_every_missing_key() {
        let err = SnoozeConfig::default().validate().unwrap_err();
        match err {
            ConfigError::Missing(keys) => {
                assert!(keys.contains(&"gateway.url"));
                assert!(keys.contains(&"server.self_scheme"));
                assert_eq!(keys.len(), 11);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_rejects_bad_timezone_and_duration() {
        let mut config = complete();
        config.scan.timezone = "Mars/Olympus".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "scan.timezone", .. })
        ));

        let mut config = complete();
        config.wake.deadline = "soon".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "wake.deadline", .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SNOOZE_PORT", "9090"),
            ("SNOOZE_DRY_RUN", "true"),
            ("SNOOZE_PROXY_MODE", "true"),
            ("SNOOZE_GATEWAY_URL", "http://other:9000"),
            ("SNOOZE_EXCLUDED_SIGNATURE", "synthetic-monitor"),
        ]);
        let mut config = complete();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert!(config.scan.dry_run);
        assert_eq!(config.wake.release_mode, ReleaseMode::Proxy);
        assert_eq!(config.gateway.url, "http://other:9000");
        assert_eq!(config.scan.excluded_signature.as_deref(), Some("synthetic-monitor"));
    }

    #[test]
    fn env_rejects_bad_port() {
        let mut config = complete();
        let err = config
            .apply_env_from(|key| (key == "SNOOZE_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SNOOZE_PORT", .. }));
    }

    #[test]
    fn timezone_falls_back_to_utc() {
        let mut scan = ScanConfig::default();
        scan.timezone = "Europe/Paris".to_string();
        assert_eq!(scan.timezone(), Tz::Europe__Paris);
        scan.timezone = "nowhere".to_string();
        assert_eq!(scan.timezone(), Tz::UTC);
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("42"), Some(Duration::from_secs(42)));
        assert_eq!(parse_duration("soon"), None);
    }
}
