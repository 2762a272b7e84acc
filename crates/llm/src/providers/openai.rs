//! Chat Completions gateway, used for OpenAI and for Ollama's
//! OpenAI-compatible endpoint.

use std::time::Duration;

use askdb_tool_runtime::{
    AssistantContent, CompletionGateway, CompletionRequest, LlmError, Message, ToolCall,
    ToolChoice, ToolSpec,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{classify_status, network_error};

pub struct OpenAiGateway {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGateway {
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: 0.0,
            max_tokens: 4096,
        })
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages.iter().map(message_to_openai).collect::<Vec<_>>(),
        });
        // Reasoning models reject sampling parameters.
        if !is_reasoning_model(&request.model) {
            body["temperature"] = json!(self.temperature);
            body["max_tokens"] = json!(self.max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools.iter().map(tool_to_openai).collect::<Vec<_>>());
        }
        if let ToolChoice::Force(name) = &request.tool_choice {
            body["tool_choice"] = json!({"type": "function", "function": {"name": name}});
        }
        body
    }
}

fn is_reasoning_model(model: &str) -> bool {
    ["o1", "o3", "o4"].iter().any(|prefix| model.starts_with(prefix))
}

pub fn tool_to_openai(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

pub fn message_to_openai(message: &Message) -> Value {
    match message {
        Message::System(text) => json!({"role": "system", "content": text}),
        Message::User(text) => json!({"role": "user", "content": text}),
        Message::Assistant(content) => {
            let mut msg = json!({"role": "assistant", "content": content.text});
            if content.tool_calls.is_empty() {
                // A reply with neither text nor calls still needs string content.
                msg["content"] = json!(content.text.as_deref().unwrap_or_default());
            } else {
                msg["tool_calls"] = content
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {"name": call.name, "arguments": call.arguments},
                        })
                    })
                    .collect();
            }
            msg
        }
        Message::Tool(result) => json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "content": result.content,
        }),
    }
}

/// Extract `choices[0].message` from a Chat Completions response.
pub fn parse_response(resp: &Value) -> Result<AssistantContent, LlmError> {
    let message = resp["choices"]
        .get(0)
        .map(|choice| &choice["message"])
        .filter(|m| m.is_object())
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message".into()))?;

    let text = message["content"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(String::from);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"]
                .as_str()
                .ok_or_else(|| LlmError::InvalidResponse("tool call without id".into()))?;
            let name = call["function"]["name"]
                .as_str()
                .ok_or_else(|| LlmError::InvalidResponse("tool call without name".into()))?;
            let arguments = match &call["function"]["arguments"] {
                Value::String(raw) => raw.clone(),
                Value::Null => String::new(),
                // Some compatible servers send the arguments as an object.
                other => other.to_string(),
            };
            tool_calls.push(ToolCall::new(id, name, arguments));
        }
    }

    Ok(AssistantContent { text, tool_calls })
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantContent, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Chat completion request to {}",
            url
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(network_error)?;

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
        let content = parse_response(&resp)?;
        debug!(
            provider = %self.name,
            tool_calls = content.tool_calls.len(),
            "Chat completion response"
        );
        Ok(content)
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}
