//! `render_canvas` — emit a dashboard artifact (markdown/HTML/code block)
//! that the WS dashboard renders inline instead of as plain chat text.

use async_trait::async_trait;

use super::{Tool, ToolResult};

pub struct RenderCanvasTool;

#[async_trait]
impl Tool for RenderCanvasTool {
    fn name(&self) -> &str {
        "render_canvas"
    }

    fn description(&self) -> &str {
        "Render a markdown, HTML, or code artifact in the dashboard's canvas panel \
         instead of inline in the chat transcript. Use for anything long enough to \
         benefit from its own view: documents, diagrams, generated code."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["markdown", "html", "code"],
                    "description": "Artifact kind"
                },
                "title": {
                    "type": "string",
                    "description": "Short title shown above the artifact"
                },
                "content": {
                    "type": "string",
                    "description": "The artifact body"
                },
                "language": {
                    "type": "string",
                    "description": "Source language, only used when kind is \"code\""
                }
            },
            "required": ["kind", "content"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let kind = match input.get("kind").and_then(|v| v.as_str()) {
            Some(k @ ("markdown" | "html" | "code")) => k,
            _ => return ToolResult::error("kind must be one of: markdown, html, code"),
        };
        let content = match input.get("content").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing required parameter: content"),
        };
        let title = input.get("title").and_then(|v| v.as_str()).unwrap_or("Untitled");
        let language = input.get("language").and_then(|v| v.as_str()).unwrap_or("");

        // The dashboard's WS client looks for this fenced marker to lift the
        // block out of the chat transcript into the canvas panel.
        let artifact = serde_json::json!({
            "kind": kind,
            "title": title,
            "language": language,
            "content": content,
        });
        ToolResult::success(format!(
            "```vesper-canvas\n{}\n```",
            serde_json::to_string(&artifact).unwrap_or_default()
        ))
    }
}
