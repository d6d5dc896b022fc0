//! snooze-scheduler — sequential task execution.
//!
//! A [`TaskQueue`] runs one task body at a time, in FIFO order. The
//! orchestrator keeps two of them:
//!
//! ```text
//! control queue ── route updates, start/stop commands, ledger writes
//! poll queue    ── deployment status polls
//! ```
//!
//! Slow mutations never delay polling and vice versa, while mutating
//! calls against the gateway and PaaS never race each other.

pub mod queue;

pub use queue::{TaskQueue, IDLE_POLL_INTERVAL};
