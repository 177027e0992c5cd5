//! Tool re-export for the Telegram adapter.
//!
//! All tools are shared — implemented once in `vesper-agent` and re-exported here
//! following the same thin-wrapper pattern as `vesper-discord/src/tools.rs`.

pub use vesper_agent::tools::build::build_tools;
