use crate::conversation::{AssistantContent, Message};
use crate::tool::ToolSpec;
use async_trait::async_trait;

/// Whether the model may pick freely among the offered tools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    /// Pin the model to one named tool.
    Force(String),
}

/// One model round trip: full transcript in, one assistant message out.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }
}

/// Trait for LLM backends that can answer with tool calls.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the agent session), not the provider.
/// Implementations live in crates/llm.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantContent, LlmError>;

    /// Provider name for logging/debugging (e.g., "openai", "claude", "ollama")
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::NetworkError(_) | LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => matches!(status, 408 | 409 | 500..=599),
            LlmError::InvalidResponse(_)
            | LlmError::AuthError(_)
            | LlmError::QuotaExceeded(_)
            | LlmError::NotConfigured(_)
            | LlmError::Other(_) => false,
        }
    }
}
