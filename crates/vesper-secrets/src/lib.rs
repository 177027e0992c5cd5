//! At-rest-encrypted secret storage, scoped to one config directory.

pub mod error;
pub mod store;

pub use error::{Result, SecretError};
pub use store::SecretStore;
