//! Shared types, config, and error definitions used across every crate.
//!
//! Kept dependency-free of the rest of the workspace so any crate can
//! depend on it without creating a cycle.

pub mod config;
pub mod error;
pub mod reminder;
pub mod types;
pub mod update;

pub use error::{Result, VesperError};
