//! `web_fetch` — built-in tool to fetch a URL and return its text content.

use async_trait::async_trait;

use super::{Tool, ToolResult};

/// Truncate fetched bodies so one page can't blow the prompt ceiling.
const MAX_FETCH_CHARS: usize = 20_000;

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP(S) and return its text content, truncated to a safe length."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http:// or https://)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let url = match input.get("url").and_then(|v| v.as_str()) {
            Some(u) if u.starts_with("http://") || u.starts_with("https://") => u,
            Some(_) => return ToolResult::error("url must start with http:// or https://"),
            None => return ToolResult::error("missing required parameter: url"),
        };

        let client = reqwest::Client::new();
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                match resp.text().await {
                    Ok(body) => {
                        if status.is_success() {
                            let truncated: String = body.chars().take(MAX_FETCH_CHARS).collect();
                            ToolResult::success(truncated)
                        } else {
                            ToolResult::error(format!("{url} returned HTTP {status}"))
                        }
                    }
                    Err(e) => ToolResult::error(format!("failed to read body from {url}: {e}")),
                }
            }
            Err(e) => ToolResult::error(format!("failed to fetch {url}: {e}")),
        }
    }
}
