//! `research`: a one-shot consultation with a stronger planning model.
//!
//! The planner sees a condensed window of the latest transcript messages
//! and never receives tools; its reply comes back as the tool result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::conversation::Message;
use crate::provider::{CompletionGateway, CompletionRequest};
use crate::tool::{opt_str_arg, Tool, ToolContext, ToolError, ToolOutput, ToolSpec};

pub const DEFAULT_WINDOW: usize = 8;

pub struct ResearchTool {
    gateway: Arc<dyn CompletionGateway>,
    model: String,
    prompt: String,
    window: usize,
}

impl ResearchTool {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            model: model.into(),
            prompt: prompt.into(),
            window: DEFAULT_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "research",
            "Consult a planning assistant before tackling a non-trivial question. It sees the \
             recent conversation and replies with a suggested plan and example SQL.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "What you need help planning"
                    }
                }
            }),
        )
    }
}

#[async_trait]
impl Tool for ResearchTool {
    async fn execute(&self, input: Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let mut excerpt = render_window(ctx.transcript.tail(self.window));
        if let Some(topic) = opt_str_arg(&input, "topic").filter(|t| !t.trim().is_empty()) {
            excerpt.push_str(&format!("\n\nThe agent asks for help with: {topic}"));
        }
        debug!(model = %self.model, window = self.window, "Consulting planning model");

        let request = CompletionRequest::new(
            self.model.clone(),
            vec![Message::System(self.prompt.clone()), Message::User(excerpt)],
        );
        let reply = self
            .gateway
            .complete(request)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("planning model failed: {e}")))?;

        Ok(ToolOutput::Text(reply.text.unwrap_or_default()))
    }
}

/// One `role: text` line per message; tool calls shown as `name(arguments)`.
fn render_window(messages: &[Message]) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for message in messages {
        let role = message.role().as_str();
        let body = match message {
            Message::Assistant(content) => {
                let mut parts: Vec<String> = content.text.iter().cloned().collect();
                parts.extend(
                    content
                        .tool_calls
                        .iter()
                        .map(|c| format!("{}({})", c.name, c.arguments)),
                );
                parts.join(" ")
            }
            Message::Tool(result) => format!("{} -> {}", result.name, result.content),
            other => other.text().unwrap_or_default().to_string(),
        };
        lines.push(format!("{role}: {body}"));
    }
    lines.join("\n")
}
