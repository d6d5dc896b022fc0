//! snooze-wake — waking suppressed services on demand.
//!
//! # Architecture
//!
//! ```text
//! inbound request ──▶ RequestCoalescer ──ensure_tracked──▶ poll queue
//!                          │                                   │
//!                    attach (shared                     DeploymentFsm::step
//!                    pending wake)                             │
//!                          │◀──── state cache (READY) ◀────────┘
//!                          ▼
//!                  release or fail waiters
//! ```
//!
//! All shared state lives in one [`WakeContext`]: the wake-state, app-id
//! and template caches, the control and poll queues, the collaborators,
//! the clock and the timing settings.

pub mod coalescer;
pub mod context;
pub mod error;
pub mod fsm;
pub mod routing;
pub mod state;

pub use coalescer::RequestCoalescer;
pub use context::{WakeContext, WakeSettings};
pub use error::{RoutingError, WakeError};
pub use fsm::{DeploymentFsm, record_savings};
pub use routing::{divert_route, restore_route, waiting_root};
pub use state::WakeState;
