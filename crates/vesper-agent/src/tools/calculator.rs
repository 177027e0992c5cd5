//! `calculator` — built-in tool for arithmetic expression evaluation.

use async_trait::async_trait;

use super::{Tool, ToolResult};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (e.g. \"(3 + 4) * 2 / 7\"). \
         Supports +, -, *, /, ^, parentheses, and common functions (sqrt, sin, cos, ln, etc.)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The arithmetic expression to evaluate"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let expr = match input.get("expression").and_then(|v| v.as_str()) {
            Some(e) if !e.trim().is_empty() => e,
            _ => return ToolResult::error("missing required parameter: expression"),
        };

        match meval::eval_str(expr) {
            Ok(value) => ToolResult::success(value.to_string()),
            Err(e) => ToolResult::error(format!("failed to evaluate '{expr}': {e}")),
        }
    }
}
