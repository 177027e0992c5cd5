//! Shared context interface for all channel adapters.
//!
//! `MessageContext` is the single trait that every channel host (gateway, discord,
//! future telegram, etc.) must implement. It replaces the old `DiscordAppContext`
//! and lets the pipeline crate stay channel-agnostic.

use std::sync::Arc;

use vesper_audit::AuditLog;
use vesper_memory::extraction::FastCompletion;
use vesper_memory::graph::GraphStore;
use vesper_memory::knowledge::KnowledgeStore;
use vesper_memory::manager::MemoryManager;
use vesper_scheduler::SchedulerHandle;
use vesper_secrets::SecretStore;
use vesper_shell::manager::TerminalManager;

use crate::runtime::AgentRuntime;

/// Minimal context interface required by the shared message pipeline.
///
/// Implemented by `AppState` in `vesper-gateway` and any future channel host.
/// Defined here (in `vesper-agent`) to avoid circular dependency: all channel
/// crates depend on `vesper-agent`; `vesper-agent` depends on `vesper-core`,
/// `vesper-trust`, `vesper-memory`, `vesper-scheduler`, `vesper-shell`, and
/// `vesper-audit`.
///
/// `audit`, `knowledge`, `graph`, and `fast_completion` default to `None` so
/// a host can adopt the pipeline before wiring up long-term memory or the
/// audit log.
pub trait MessageContext: Send + Sync {
    fn agent(&self) -> &AgentRuntime;
    fn memory(&self) -> &MemoryManager;
    fn terminal(&self) -> &tokio::sync::Mutex<TerminalManager>;
    fn scheduler(&self) -> &SchedulerHandle;

    fn audit(&self) -> Option<&AuditLog> {
        None
    }

    /// Returns an owned handle (not a borrow) since fire-and-forget
    /// extraction needs to move it into a spawned task.
    fn knowledge(&self) -> Option<Arc<KnowledgeStore>> {
        None
    }

    /// Same reasoning as `knowledge`: owned so it can outlive this call.
    fn graph(&self) -> Option<Arc<GraphStore>> {
        None
    }

    fn fast_completion(&self) -> Option<Arc<dyn FastCompletion>> {
        None
    }

    /// Used to resolve `${secret:name}` templates in direct-HTTP tool
    /// configuration. `None` until a host wires up `vesper-secrets`.
    fn secrets(&self) -> Option<Arc<SecretStore>> {
        None
    }

    /// Full process config, used by `tools::build` to assemble direct-HTTP
    /// tools, remote MCP-style tool servers, and the web-search backend.
    fn config(&self) -> Option<&vesper_core::config::VesperConfig> {
        None
    }

    /// Channels currently connected to this host, for `send_message`'s
    /// cross-channel listing. Empty for hosts with a single implicit channel.
    fn connected_channels(&self) -> Vec<String> {
        Vec::new()
    }

    /// Deliver a message to another channel this host manages. Hosts that
    /// don't support cross-channel delivery reject the call.
    fn send_to_channel(&self, _channel: &str, _recipient: &str, _message: &str) -> Result<(), String> {
        Err("cross-channel messaging not supported by this host".to_string())
    }

    /// Local port the dashboard HTTP/WS surface is bound to, if any, for the
    /// `/config` slash command to report back.
    fn gateway_port(&self) -> Option<u16> {
        None
    }

    /// Path to the SQLite database backing this host, if any.
    fn database_path(&self) -> Option<&str> {
        None
    }
}
