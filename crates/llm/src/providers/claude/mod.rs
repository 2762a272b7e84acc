//! Claude (Anthropic Messages API) implementation of [`CompletionGateway`].

mod translate;

use std::time::Duration;

use askdb_tool_runtime::{
    AssistantContent, CompletionGateway, CompletionRequest, LlmError, ToolChoice,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{classify_status, network_error};
use self::translate::{messages_to_claude, parse_response, tool_spec_to_claude};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct ClaudeGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl ClaudeGateway {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.0,
            max_tokens: 4096,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let (system, messages) = messages_to_claude(&request.messages);
        let mut body = json!({
            "model": request.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools.iter().map(tool_spec_to_claude).collect::<Vec<_>>());
        }
        if let ToolChoice::Force(name) = &request.tool_choice {
            body["tool_choice"] = json!({"type": "tool", "name": name});
        }
        body
    }
}

#[async_trait]
impl CompletionGateway for ClaudeGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantContent, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Claude request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after.as_deref(), &body));
        }

        let resp: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_response(&resp)
    }

    fn provider_name(&self) -> &str {
        "claude"
    }
}
