//! `web_search` — built-in tool backed by a configured search provider
//! (Brave Search API, configured via `providers.web_search` in `vesper.toml`).

use async_trait::async_trait;
use vesper_core::config::WebSearchConfig;

use super::{Tool, ToolResult};

pub struct WebSearchTool {
    config: Option<WebSearchConfig>,
}

impl WebSearchTool {
    pub fn new(config: Option<WebSearchConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return a short list of titles, URLs, and snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let config = match &self.config {
            Some(c) => c,
            None => return ToolResult::error("web_search is not configured (providers.web_search)"),
        };
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q,
            _ => return ToolResult::error("missing required parameter: query"),
        };

        let client = reqwest::Client::new();
        let resp = client
            .get(&config.base_url)
            .header("X-Subscription-Token", &config.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query)])
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("web search request failed: {e}")),
        };

        if !resp.status().is_success() {
            return ToolResult::error(format!("web search returned HTTP {}", resp.status()));
        }

        let body: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("failed to parse search response: {e}")),
        };

        let results = body
            .get("web")
            .and_then(|w| w.get("results"))
            .and_then(|r| r.as_array());

        let results = match results {
            Some(r) if !r.is_empty() => r,
            _ => return ToolResult::success(format!("No results for: {query}")),
        };

        let mut out = String::new();
        for entry in results.iter().take(5) {
            let title = entry.get("title").and_then(|v| v.as_str()).unwrap_or("(untitled)");
            let url = entry.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let snippet = entry.get("description").and_then(|v| v.as_str()).unwrap_or("");
            out.push_str(&format!("- {title}\n  {url}\n  {snippet}\n"));
        }
        ToolResult::success(out)
    }
}
