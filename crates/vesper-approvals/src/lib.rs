//! Approval broker: promise-style gating for high-risk agent actions.
//!
//! A caller asks `ApprovalBroker::request(...)` and awaits the result; an
//! admin (via the dashboard or CLI) resolves it with `approve`/`deny`, or it
//! auto-denies after 10 minutes of silence.

pub mod broker;
pub mod db;
pub mod error;
pub mod types;

pub use broker::ApprovalBroker;
pub use error::{ApprovalError, Result};
pub use types::{ApprovalOutcome, ApprovalRequest, ApprovalStatus, RiskLevel};
