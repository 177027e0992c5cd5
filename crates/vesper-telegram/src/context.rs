//! Telegram context interface — re-exported from the shared pipeline.
//!
//! `TelegramAppContext` is an alias for `vesper_agent::pipeline::MessageContext`.
//! All channel adapters share the same trait, defined once in `vesper-agent`.

pub use vesper_agent::pipeline::MessageContext as TelegramAppContext;
