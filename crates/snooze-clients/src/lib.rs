//! snooze-clients — the orchestrator's external collaborators.
//!
//! Each collaborator is a trait so the wake and scan logic can run against
//! real REST endpoints in production and in-memory doubles in tests:
//!
//! - [`GatewayApi`]: routes, traffic events, waiting-page templates
//!   ([`HttpGateway`] speaks the Otoroshi admin API)
//! - [`PaasApi`]: app status, start and stop ([`HttpPaas`] speaks the
//!   Clever Cloud v2 API)
//! - [`Notifier`]: fire-and-forget chat messages ([`ChatNotifier`])
//!
//! The [`memory`] module holds scriptable doubles for all three.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod notify;
pub mod paas;

pub use error::{ClientError, ClientResult};
pub use gateway::{GatewayApi, HttpGateway, count_qualifying_events};
pub use notify::{ChatNotifier, Notifier};
pub use paas::{HttpPaas, PaasApi};
