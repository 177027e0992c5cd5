//! Append-only audit log: every agent decision, cost-tagged.

pub mod error;
pub mod log;
pub mod types;

pub use error::{AuditError, Result};
pub use log::AuditLog;
pub use types::{AuditRecord, ChannelCost, CostSummary};
