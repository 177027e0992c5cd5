//! Provider selection — resolves `ProvidersConfig` into a concrete
//! `Box<dyn LlmProvider>` at startup.
//!
//! Priority mirrors `mcp_lifecycle::uses_claude_cli`: explicit config slots
//! win over env-var auto-detection, and `claude-cli` is only picked when
//! nothing else is configured or present in the environment.

use anyhow::{bail, Context};

use vesper_agent::anthropic::AnthropicProvider;
use vesper_agent::bedrock::BedrockProvider;
use vesper_agent::claude_cli::ClaudeCliProvider;
use vesper_agent::copilot::CopilotProvider;
use vesper_agent::ollama::OllamaProvider;
use vesper_agent::openai::OpenAiProvider;
use vesper_agent::provider::LlmProvider;
use vesper_agent::qwen_oauth::QwenOAuthProvider;
use vesper_agent::registry;
use vesper_agent::vertex::VertexProvider;
use vesper_core::config::VesperConfig;

/// Resolve the configured LLM provider, in priority order.
pub fn build_provider(config: &VesperConfig) -> anyhow::Result<Box<dyn LlmProvider>> {
    let providers = &config.providers;

    if let Some(cli) = &providers.claude_cli {
        return Ok(Box::new(
            ClaudeCliProvider::new(cli.command.clone()).with_mcp_bridge(cli.mcp_bridge.clone()),
        ));
    }

    if let Some(cfg) = &providers.anthropic {
        return Ok(Box::new(AnthropicProvider::new(
            cfg.api_key.clone(),
            Some(cfg.base_url.clone()),
        )));
    }

    if let Some(cfg) = &providers.openai {
        return Ok(Box::new(OpenAiProvider::new(
            cfg.api_key.clone(),
            Some(cfg.base_url.clone()),
        )));
    }

    if let Some(cfg) = &providers.ollama {
        return Ok(Box::new(OllamaProvider::new(Some(cfg.base_url.clone()))));
    }

    if let Some(cfg) = &providers.copilot {
        return Ok(Box::new(
            CopilotProvider::from_file(&cfg.token_path).context("loading copilot token")?,
        ));
    }

    if let Some(cfg) = &providers.qwen_oauth {
        return Ok(Box::new(
            QwenOAuthProvider::from_file(&cfg.credentials_path)
                .context("loading qwen oauth credentials")?,
        ));
    }

    if let Some(cfg) = &providers.bedrock {
        return Ok(Box::new(
            BedrockProvider::from_env(cfg.region.clone(), cfg.profile.as_deref())
                .context("loading bedrock credentials from environment")?,
        ));
    }

    if let Some(cfg) = &providers.vertex {
        return Ok(Box::new(
            VertexProvider::from_file(&cfg.key_file, cfg.project_id.clone(), cfg.location.clone())
                .context("loading vertex service account key")?,
        ));
    }

    if let Some(entry) = providers.openai_compat.first() {
        let known = registry::lookup(&entry.id);
        let base_url = entry
            .base_url
            .clone()
            .or_else(|| known.map(|k| k.base_url.to_string()))
            .ok_or_else(|| anyhow::anyhow!("openai_compat entry '{}' has no base_url and is not a known provider", entry.id))?;
        let chat_path = entry
            .chat_path
            .clone()
            .or_else(|| known.map(|k| k.chat_path.to_string()))
            .unwrap_or_else(|| "/v1/chat/completions".to_string());
        return Ok(Box::new(OpenAiProvider::with_path(
            entry.id.clone(),
            entry.api_key.clone(),
            base_url,
            chat_path,
        )));
    }

    // Nothing configured explicitly — fall back to environment auto-detection.
    if let Ok(key) = std::env::var("ANTHROPIC_OAUTH_TOKEN").or_else(|_| std::env::var("ANTHROPIC_API_KEY")) {
        return Ok(Box::new(AnthropicProvider::new(key, None)));
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        return Ok(Box::new(OpenAiProvider::new(key, None)));
    }
    if which::which("claude").is_ok() {
        return Ok(Box::new(ClaudeCliProvider::new("claude".to_string())));
    }

    bail!("no LLM provider configured — set one of providers.{{anthropic,openai,ollama,...}} in config, or an ANTHROPIC_API_KEY/OPENAI_API_KEY env var, or install the claude CLI")
}
