//! snooze-state — in-process and persisted state for snooze.
//!
//! # Components
//!
//! - **`cache`** — [`TtlCache`], a keyed store whose TTL deletions are
//!   drained by a background sweep and guarded by version stamps, so a
//!   deletion scheduled for an old value never removes a newer one.
//! - **`savings`** — pure cost-savings arithmetic for suppressed apps.
//! - **`ledger`** — [`SavingsLedger`], per-service accumulated savings
//!   persisted in redb, plus a synthetic global row.
//!
//! Ledger values are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by `(service_id, app_id)`.

pub mod cache;
pub mod error;
pub mod ledger;
pub mod savings;
pub mod tables;

pub use cache::TtlCache;
pub use error::{StateError, StateResult};
pub use ledger::{SavingsLedger, SavingsRecord};
