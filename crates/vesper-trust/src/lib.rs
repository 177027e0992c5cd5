//! Trust Kernel: constitution-gated permission checks for agent actions.

pub mod error;
pub mod kernel;

pub use error::{Result, TrustError};
pub use kernel::{TrustDecision, TrustKernel, SENSITIVE_KEYWORDS};
