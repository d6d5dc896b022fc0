//! snooze-core — shared domain types, configuration, and time sources.
//!
//! Everything here is plain data: the gateway [`Route`] and PaaS [`App`]
//! models as they travel over the wire, the metadata keys the orchestrator
//! stashes on routes, the `snooze.toml` configuration, and the [`Clock`]
//! used for wall-clock timestamps.

pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ReleaseMode, SnoozeConfig, parse_duration};
pub use types::*;
