//! Persistent outbound delivery queue with per-item exponential backoff.

pub mod error;
pub mod queue;
pub mod types;

pub use error::{QueueError, Result};
pub use queue::{DeliveryQueue, DeliverySender};
pub use types::{DeliveryItem, DeliveryStatus, MAX_ATTEMPTS};
