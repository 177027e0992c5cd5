//! Tool execution loop — the core agentic behavior.
//!
//! Flow: prompt → LLM → if tool_use → dispatch tools in parallel → inject
//! results → LLM → repeat. Stops when: stop_reason is not "tool_use", max
//! iterations reached, cancellation fires, or error. Every dispatched call
//! is gated by the trust kernel before it runs; a blocked call never
//! reaches the tool.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vesper_trust::TrustKernel;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ToolCall};

use super::{Tool, ToolResult};

/// Maximum tool loop iterations to prevent runaway agents.
const MAX_ITERATIONS: usize = 10;
/// Per-call budget, raced against dispatch — a hung tool never stalls the
/// rest of the batch.
const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the full tool execution loop (non-streaming).
///
/// Starts from `initial_request`, which must have `messages` or `raw_messages` set.
/// Returns the final `ChatResponse` (the one with `stop_reason != "tool_use"`) along
/// with the distinct set of tool names invoked during the run, in first-seen order.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    tools: &[Box<dyn Tool>],
    trust: Option<&TrustKernel>,
    cancel: Option<&CancellationToken>,
) -> Result<(ChatResponse, Vec<String>), crate::provider::ProviderError> {
    // Build initial raw JSON message list from the structured messages.
    let mut raw_messages: Vec<serde_json::Value> =
        if let Some(ref raw) = initial_request.raw_messages {
            raw.clone()
        } else {
            initial_request
                .messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect()
        };

    let mut last_response: Option<ChatResponse> = None;
    let mut seen_tools: HashSet<String> = HashSet::new();
    let mut called_tools: Vec<String> = Vec::new();

    for iteration in 0..MAX_ITERATIONS {
        if is_cancelled(cancel) {
            info!(iteration, "tool loop cancelled");
            break;
        }

        // Build the request for this iteration, injecting the full message history.
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");

        let response = match run_cancellable(provider.send(&req), cancel).await {
            Some(r) => r?,
            None => {
                info!(iteration, "tool loop cancelled mid-request");
                break;
            }
        };

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(iteration, "tool loop complete — no more tool calls");
            return Ok((response, called_tools));
        }

        // Build the assistant turn content block list.
        // It includes any text content plus the tool_use blocks.
        let mut assistant_content: Vec<serde_json::Value> = Vec::new();

        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
        }

        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
            if seen_tools.insert(call.name.clone()) {
                called_tools.push(call.name.clone());
            }
        }

        // Append the assistant message.
        raw_messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        // Dispatch every call in the batch concurrently, each gated by the
        // trust kernel and individually timeout-bounded.
        let results = futures_util::future::join_all(
            response
                .tool_calls
                .iter()
                .map(|call| dispatch_one(tools, call, trust)),
        )
        .await;

        let tool_result_content: Vec<serde_json::Value> = response
            .tool_calls
            .iter()
            .zip(results)
            .map(|(call, result)| {
                serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": result.content,
                    "is_error": result.is_error,
                })
            })
            .collect();

        // Append the user message containing all tool results.
        raw_messages.push(serde_json::json!({
            "role": "user",
            "content": tool_result_content,
        }));

        last_response = Some(response);
    }

    if last_response.is_some() {
        warn!(
            max_iterations = MAX_ITERATIONS,
            "tool loop hit maximum iterations"
        );
    }

    // If we have a last response use that, otherwise return an error.
    if let Some(resp) = last_response {
        Ok((resp, called_tools))
    } else {
        Err(crate::provider::ProviderError::Parse(format!(
            "tool loop exceeded {MAX_ITERATIONS} iterations without a final response"
        )))
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.map(|c| c.is_cancelled()).unwrap_or(false)
}

/// Race a future against cancellation. `None` means cancellation won.
async fn run_cancellable<F, T>(fut: F, cancel: Option<&CancellationToken>) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    match cancel {
        Some(token) => tokio::select! {
            result = fut => Some(result),
            _ = token.cancelled() => None,
        },
        None => Some(fut.await),
    }
}

/// Gate a single call through the trust kernel, then dispatch it with a
/// timeout. A blocked call never touches the tool at all.
async fn dispatch_one(
    tools: &[Box<dyn Tool>],
    call: &ToolCall,
    trust: Option<&TrustKernel>,
) -> ToolResult {
    if let Some(trust) = trust {
        let action = format!("{}({})", call.name, call.input);
        let decision = trust.check(&action);
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_else(|| "blocked by trust kernel".to_string());
            warn!(tool = %call.name, reason = %reason, "tool call blocked");
            return ToolResult::error(format!("blocked: {reason}"));
        }
    }

    match tokio::time::timeout(TOOL_CALL_TIMEOUT, execute_tool(tools, call)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(tool = %call.name, "tool call timed out");
            ToolResult::error(format!("tool '{}' timed out after 30s", call.name))
        }
    }
}

/// Find and execute the named tool. Returns an error ToolResult if not found.
async fn execute_tool(tools: &[Box<dyn Tool>], call: &ToolCall) -> ToolResult {
    match tools.iter().find(|t| t.name() == call.name) {
        Some(tool) => {
            debug!(tool = %call.name, "executing tool");
            tool.execute(call.input.clone()).await
        }
        None => ToolResult::error(format!("unknown tool: {}", call.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, ProviderError, Role};
    use async_trait::async_trait;

    struct EchoTool;
    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, input: serde_json::Value) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    struct OneShotToolCaller;
    #[async_trait]
    impl LlmProvider for OneShotToolCaller {
        fn name(&self) -> &str {
            "test"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            // Once tool results appear in the message history, stop.
            let has_tool_result = req
                .raw_messages
                .as_ref()
                .map(|m| m.len() > 1)
                .unwrap_or(false);
            if has_tool_result {
                return Ok(ChatResponse {
                    content: "done".to_string(),
                    model: req.model.clone(),
                    tokens_in: 1,
                    tokens_out: 1,
                    stop_reason: "stop".to_string(),
                    tool_calls: Vec::new(),
                });
            }
            Ok(ChatResponse {
                content: String::new(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "tool_use".to_string(),
                tool_calls: vec![ToolCall {
                    id: "call1".to_string(),
                    name: "echo".to_string(),
                    input: serde_json::json!({"x": 1}),
                }],
            })
        }
    }

    fn dummy_request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            system: "test".to_string(),
            system_prompt: None,
            messages: vec![Message { role: Role::User, content: "hi".to_string() }],
            max_tokens: 64,
            stream: false,
            thinking: None,
            tools: Vec::new(),
            raw_messages: None,
        }
    }

    #[tokio::test]
    async fn dispatches_tool_and_completes() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(EchoTool)];
        let (resp, called) = run_tool_loop(&OneShotToolCaller, dummy_request(), &tools, None, None)
            .await
            .unwrap();
        assert_eq!(resp.content, "done");
        assert_eq!(called, vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn trust_kernel_blocks_matching_call() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(EchoTool)];
        let trust = TrustKernel::from_str("# Forbidden\n- delete user data without confirmation");
        let result = dispatch_one(
            &tools,
            &ToolCall {
                id: "1".to_string(),
                name: "echo".to_string(),
                input: serde_json::json!({"action": "delete everything"}),
            },
            Some(&trust),
        )
        .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_early() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(EchoTool)];
        let token = CancellationToken::new();
        token.cancel();
        let result = run_tool_loop(&OneShotToolCaller, dummy_request(), &tools, None, Some(&token)).await;
        assert!(result.is_err());
    }
}
