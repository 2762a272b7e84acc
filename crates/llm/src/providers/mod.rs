pub mod claude;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use askdb_core::config::LlmConfig;
use askdb_tool_runtime::{CompletionGateway, LlmError};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Create the gateway for the configured provider.
///
/// Ollama is served through its OpenAI-compatible endpoint.
pub fn create_gateway(config: &LlmConfig) -> Result<Arc<dyn CompletionGateway>, LlmError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider.as_str() {
        "openai" => {
            let api_key = config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            let base_url = config.openai_base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            let gateway = openai::OpenAiGateway::new("openai", base_url, Some(api_key.clone()), timeout)?
                .with_sampling(config.temperature, config.max_tokens);
            Ok(Arc::new(gateway))
        }
        "anthropic" | "claude" => {
            let api_key = config
                .anthropic_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            let mut gateway = claude::ClaudeGateway::new(api_key.clone(), timeout)?
                .with_sampling(config.temperature, config.max_tokens);
            if let Some(base_url) = &config.anthropic_base_url {
                gateway = gateway.with_base_url(base_url);
            }
            Ok(Arc::new(gateway))
        }
        "ollama" => {
            let gateway = openai::OpenAiGateway::new("ollama", &config.ollama_url, None, timeout)?
                .with_sampling(config.temperature, config.max_tokens);
            Ok(Arc::new(gateway))
        }
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}
