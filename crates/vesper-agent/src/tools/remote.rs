//! Remote tool-server tools — MCP-style JSON-RPC 2.0 over two transports.
//!
//! `vesper.toml`'s `[[tools.mcp]]` entries declare a server's transport and
//! the tools it exposes (a live `tools/list` discovery round-trip on every
//! message rebuild would be wasteful; the declared list plays that role,
//! matching how `script_tool.rs`'s plugin manifests are read synchronously
//! while the actual work happens in `execute()`). Each declared tool becomes
//! one `RemoteTool`, namespaced `serverName__toolName`. `initialize` /
//! `notifications/initialized` / `tools/call` are a live round-trip per call.

use async_trait::async_trait;
use serde_json::{json, Value};
use vesper_core::config::{McpServerConfig, McpTransportConfig, RemoteToolSpec};

use super::{Tool, ToolResult};

pub struct RemoteTool {
    qualified_name: String,
    description: String,
    spec: RemoteToolSpec,
    transport: McpTransportConfig,
}

impl RemoteTool {
    /// Build one `RemoteTool` per declared tool in `server`.
    pub fn build(server: &McpServerConfig) -> Vec<Box<dyn Tool>> {
        server
            .tools
            .iter()
            .map(|spec| {
                Box::new(RemoteTool {
                    qualified_name: format!("{}__{}", server.name, spec.name),
                    description: spec.description.clone(),
                    spec: spec.clone(),
                    transport: server.transport.clone(),
                }) as Box<dyn Tool>
            })
            .collect()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.qualified_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.spec.input_schema.clone()
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        match &self.transport {
            McpTransportConfig::ProcessStdio { command, args } => {
                call_stdio(command, args, &self.spec.name, input).await
            }
            McpTransportConfig::ServerSentEvents { url } => {
                call_sse(url, &self.spec.name, input).await
            }
        }
    }
}

/// Spawn the subprocess, exchange newline-delimited JSON-RPC, and tear it
/// down. A fresh process per call — stateless, matching `ScriptTool`'s model.
async fn call_stdio(command: &str, args: &[String], tool_name: &str, input: Value) -> ToolResult {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::process::Command;

    let mut child = match Command::new(command)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => return ToolResult::error(format!("failed to spawn tool server '{command}': {e}")),
    };

    let mut stdin = match child.stdin.take() {
        Some(s) => s,
        None => return ToolResult::error("tool server stdin not piped"),
    };
    let stdout = match child.stdout.take() {
        Some(s) => s,
        None => return ToolResult::error("tool server stdout not piped"),
    };
    let mut reader = BufReader::new(stdout);

    let messages = [
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": { "protocolVersion": "2025-06-18", "capabilities": {}, "clientInfo": { "name": "vesper", "version": env!("CARGO_PKG_VERSION") } }
        }),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": { "name": tool_name, "arguments": input }
        }),
    ];

    for msg in &messages {
        let line = format!("{}\n", msg);
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            let _ = child.kill().await;
            return ToolResult::error(format!("failed to write to tool server: {e}"));
        }
    }

    // Read lines until we see the response to request id 2 (tools/call),
    // skipping the initialize response (id 1) along the way.
    let result = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await.ok()?;
            if n == 0 {
                return None;
            }
            let parsed: Value = serde_json::from_str(line.trim()).ok()?;
            if parsed.get("id").and_then(|v| v.as_i64()) == Some(2) {
                return Some(parsed);
            }
        }
    })
    .await;

    let _ = child.kill().await;

    match result {
        Err(_) => ToolResult::error(format!("tool server call to '{tool_name}' timed out")),
        Ok(None) => ToolResult::error(format!("tool server closed before responding to '{tool_name}'")),
        Ok(Some(response)) => extract_call_result(&response),
    }
}

/// Open the SSE stream, read the `endpoint` event for the POST URL, post the
/// `tools/call` request there, then read the matching response frame from
/// the same SSE stream.
async fn call_sse(url: &str, tool_name: &str, input: Value) -> ToolResult {
    use futures_util::StreamExt;

    let client = reqwest::Client::new();
    let resp = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => return ToolResult::error(format!("failed to open SSE stream for '{tool_name}': {e}")),
    };

    let mut stream = resp.bytes_stream();
    let mut buf = String::new();
    let mut post_url: Option<String> = None;

    let post_result = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.ok()?;
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(frame_end) = buf.find("\n\n") {
                let frame = buf[..frame_end].to_string();
                buf.drain(..frame_end + 2);

                if post_url.is_none() {
                    if let Some(endpoint) = parse_sse_field(&frame, "endpoint") {
                        post_url = Some(endpoint);
                        let client = client.clone();
                        let call = json!({
                            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                            "params": { "name": tool_name, "arguments": input }
                        });
                        client
                            .post(post_url.as_ref().unwrap())
                            .json(&call)
                            .send()
                            .await
                            .ok()?;
                        continue;
                    }
                }

                if let Some(data) = parse_sse_field(&frame, "data") {
                    if let Ok(parsed) = serde_json::from_str::<Value>(&data) {
                        if parsed.get("id").and_then(|v| v.as_i64()) == Some(1) {
                            return Some(parsed);
                        }
                    }
                }
            }
        }
        None
    })
    .await;

    match post_result {
        Err(_) => ToolResult::error(format!("SSE tool call to '{tool_name}' timed out")),
        Ok(None) => ToolResult::error(format!("SSE stream closed before responding to '{tool_name}'")),
        Ok(Some(response)) => extract_call_result(&response),
    }
}

/// Extract an SSE field's value (e.g. `data: {...}` → `{...}`) from one frame.
fn parse_sse_field(frame: &str, field: &str) -> Option<String> {
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix(&format!("{field}: ")) {
            return Some(rest.to_string());
        }
    }
    None
}

/// Pull `result.content[0].text` (or the error message) out of a JSON-RPC
/// `tools/call` response.
fn extract_call_result(response: &Value) -> ToolResult {
    if let Some(err) = response.get("error") {
        return ToolResult::error(
            err.get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("tool server returned an error")
                .to_string(),
        );
    }

    let result = match response.get("result") {
        Some(r) => r,
        None => return ToolResult::error("tool server response had neither result nor error"),
    };

    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let text = result
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|block| block.get("text"))
        .and_then(|t| t.as_str())
        .unwrap_or("(no content)")
        .to_string();

    if is_error {
        ToolResult::error(text)
    } else {
        ToolResult::success(text)
    }
}
