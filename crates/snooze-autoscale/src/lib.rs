//! snooze-autoscale — binary scale-to-zero policy.
//!
//! - **`scanner`** — the periodic scan: keeps must-stay-up apps awake and
//!   suppresses idle ones (divert route, then stop app).
//! - **`window`** — timezone-aware `HH:MM-HH:MM` uptime windows.
//! - **`report`** — current and past savings, served over HTTP and
//!   announced periodically.
//! - **`candidates`** — idle routes that have not opted in yet.

pub mod candidates;
pub mod periodic;
pub mod report;
pub mod scanner;
pub mod window;

pub use candidates::{Candidate, announce_candidates, compute_candidates, run_candidates};
pub use report::{SavingsReport, announce_savings, compute_savings, run_reports};
pub use scanner::{ScanPolicy, Scanner};
pub use window::UptimeWindows;
