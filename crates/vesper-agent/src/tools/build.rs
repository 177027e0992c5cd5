//! Tool registry — builds the canonical tool list for any channel adapter.
//!
//! Three kinds of tools are merged into one namespace: built-ins (this
//! module's direct constructions), direct-HTTP tools (`tools.http` config),
//! and remote MCP-style tool-server tools (`tools.mcp` config, namespaced
//! `serverName__toolName`). Skills are loaded alongside and contribute both
//! a `skill_read` tool and a compact index injected into the system prompt.

use std::sync::Arc;

use crate::pipeline::context::MessageContext;
use crate::provider::ToolDefinition;

use super::bash_session::BashSessionTool;
use super::execute_command::ExecuteCommandTool;
use super::knowledge::{KnowledgeSearchTool, KnowledgeWriteTool};
use super::reminder::ReminderTool;
use super::skill::{format_skill_index, load_skills, SkillReadTool};
use super::web_search::WebSearchTool;
use super::{to_definitions, Tool};

/// Everything `build_tools` hands back to the pipeline for one turn.
pub struct BuiltTools {
    pub tools: Vec<Box<dyn Tool>>,
    /// Compact skill index, ready to append to the system prompt's volatile
    /// tier. Empty when no skills are loaded.
    pub skill_index: String,
}

/// Build the full list of tools available to the AI for a given request.
///
/// Includes:
/// - `read_file`, `write_file`, `list_files`, `search_files`, `patch_file` (filesystem)
/// - `execute_command` (one-shot sh -c via TerminalManager)
/// - `bash` (persistent PTY bash session via TerminalManager)
/// - `managed_process` (detached background commands, tracked by id)
/// - `current_time`, `calculator`, `web_fetch`, `web_search`, `render_canvas`
/// - `reminder` (schedule proactive reminders via the scheduler)
/// - `knowledge_search`, `knowledge_write` (long-term knowledge base)
/// - `skill_read`, plus one set of direct-HTTP and remote tool-server tools
///   per the host's configured `tools.http` / `tools.mcp` entries.
///
/// `channel_name` and `channel_id` are forwarded to `ReminderTool` so it can
/// embed the correct delivery target in the persisted job action.
/// `session_key` scopes any per-session tool state (currently unused by the
/// built-ins but threaded through for tools that will want it).
pub fn build_tools<C: MessageContext + 'static>(
    ctx: Arc<C>,
    channel_name: &str,
    channel_id: Option<u64>,
    _session_key: Option<&str>,
) -> BuiltTools {
    let config = ctx.config();
    let web_search_config = config.and_then(|c| c.providers.web_search.clone());

    let mut tools: Vec<Box<dyn Tool>> = vec![
        Box::new(super::read_file::ReadFileTool),
        Box::new(super::write_file::WriteFileTool),
        Box::new(super::list_files::ListFilesTool),
        Box::new(super::search_files::SearchFilesTool),
        Box::new(ExecuteCommandTool::new(Arc::clone(&ctx))),
        Box::new(BashSessionTool::new(Arc::clone(&ctx))),
        Box::new(super::managed_process::ManagedProcessTool),
        Box::new(super::current_time::CurrentTimeTool),
        Box::new(super::calculator::CalculatorTool),
        Box::new(super::web_fetch::WebFetchTool),
        Box::new(WebSearchTool::new(web_search_config)),
        Box::new(super::render_canvas::RenderCanvasTool),
        Box::new(ReminderTool::new(
            Arc::clone(&ctx),
            channel_name,
            channel_id,
        )),
        Box::new(KnowledgeSearchTool::new(Arc::clone(&ctx))),
        Box::new(KnowledgeWriteTool::new(Arc::clone(&ctx))),
        Box::new(super::patch_file::PatchFileTool),
    ];

    // Direct-HTTP and remote MCP-style tool-server tools, per the host's
    // declared config. Both are additive namespaces merged into the same list.
    if let Some(config) = config {
        let secrets = ctx.secrets();
        for server in &config.tools.http {
            tools.extend(super::http_tool::HttpTool::build(server, secrets.clone()));
        }
        for server in &config.tools.mcp {
            tools.extend(super::remote::RemoteTool::build(server));
        }
    }

    // Skills: loaded fresh on every build (no restart needed after adding
    // one), contributing a skill_read tool plus a system-prompt index.
    let skills = load_skills();
    let skill_index = format_skill_index(&skills);
    if !skills.is_empty() {
        tools.push(Box::new(SkillReadTool::new(skills)));
    }

    // Load script plugins from ~/.vesper/tools/ — no restart needed after adding a plugin,
    // tools are re-scanned on each build_tools() call (i.e. each new message).
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let tools_dir = std::path::Path::new(&home).join(".vesper/tools");
    tools.extend(super::script_tool::load_script_tools(&tools_dir));

    BuiltTools { tools, skill_index }
}

/// Convert a tool list to API-level definitions for the LLM request.
pub fn tool_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    to_definitions(tools)
}
