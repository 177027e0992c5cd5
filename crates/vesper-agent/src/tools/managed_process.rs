//! `managed_process` — start, poll, and kill long-running background
//! commands that outlive a single tool call (builds, servers, watchers).
//!
//! Distinct from `bash` (one persistent interactive PTY session): each
//! managed process is its own subprocess, tracked by a short id, with
//! output buffered in memory until the caller asks for it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{Tool, ToolResult};

struct ManagedProcess {
    child: tokio::process::Child,
    output: Arc<Mutex<String>>,
}

/// Process-wide registry of running background processes, keyed by a short id.
static PROCESSES: std::sync::OnceLock<DashMap<String, ManagedProcess>> = std::sync::OnceLock::new();

fn registry() -> &'static DashMap<String, ManagedProcess> {
    PROCESSES.get_or_init(DashMap::new)
}

pub struct ManagedProcessTool;

#[async_trait]
impl Tool for ManagedProcessTool {
    fn name(&self) -> &str {
        "managed_process"
    }

    fn description(&self) -> &str {
        "Start, check on, or kill a long-running background command (e.g. a dev server \
         or build watcher) that should keep running across multiple turns. Actions: \
         start, status, kill, list."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["start", "status", "kill", "list"] },
                "command": { "type": "string", "description": "Shell command to run (action=start)" },
                "id": { "type": "string", "description": "Process id returned by start (action=status/kill)" }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let action = input.get("action").and_then(|v| v.as_str()).unwrap_or("");
        match action {
            "start" => start(input).await,
            "status" => status(input),
            "kill" => kill(input).await,
            "list" => list(),
            _ => ToolResult::error("action must be one of: start, status, kill, list"),
        }
    }
}

async fn start(input: serde_json::Value) -> ToolResult {
    let command = match input.get("command").and_then(|v| v.as_str()) {
        Some(c) if !c.trim().is_empty() => c.to_string(),
        _ => return ToolResult::error("missing required parameter: command"),
    };

    let mut child = match tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => return ToolResult::error(format!("failed to start process: {e}")),
    };

    let id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    let output = Arc::new(Mutex::new(String::new()));

    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, Arc::clone(&output));
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, Arc::clone(&output));
    }

    registry().insert(id.clone(), ManagedProcess { child, output });
    ToolResult::success(format!("started process '{id}': {command}"))
}

fn spawn_reader<R>(reader: R, output: Arc<Mutex<String>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    use tokio::io::{AsyncBufReadExt, BufReader};
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buf = output.lock().await;
            buf.push_str(&line);
            buf.push('\n');
            // Cap buffered output so a chatty process can't grow unbounded.
            if buf.len() > 50_000 {
                let cut = buf.len() - 50_000;
                buf.drain(..cut);
            }
        }
    });
}

fn status(input: serde_json::Value) -> ToolResult {
    let id = match input.get("id").and_then(|v| v.as_str()) {
        Some(i) => i,
        None => return ToolResult::error("missing required parameter: id"),
    };
    let entry = match registry().get(id) {
        Some(e) => e,
        None => return ToolResult::error(format!("no managed process '{id}'")),
    };
    let output = entry.output.try_lock().map(|g| g.clone()).unwrap_or_default();
    ToolResult::success(format!("process '{id}' output so far:\n{output}"))
}

async fn kill(input: serde_json::Value) -> ToolResult {
    let id = match input.get("id").and_then(|v| v.as_str()) {
        Some(i) => i.to_string(),
        None => return ToolResult::error("missing required parameter: id"),
    };
    match registry().remove(&id) {
        Some((_, mut proc)) => {
            let _ = proc.child.kill().await;
            ToolResult::success(format!("killed process '{id}'"))
        }
        None => ToolResult::error(format!("no managed process '{id}'")),
    }
}

fn list() -> ToolResult {
    let ids: Vec<String> = registry().iter().map(|e| e.key().clone()).collect();
    if ids.is_empty() {
        ToolResult::success("no managed processes running")
    } else {
        ToolResult::success(ids.join("\n"))
    }
}
