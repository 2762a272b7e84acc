//! `clarify`: ask the human a question and return their answer verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tool::{opt_str_arg, Tool, ToolContext, ToolError, ToolOutput, ToolSpec};

/// Host-supplied prompt: receives the question, blocks until the human replies.
pub type ClarifyCallback = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub struct ClarifyTool {
    callback: ClarifyCallback,
}

impl ClarifyTool {
    pub fn new(callback: ClarifyCallback) -> Self {
        Self { callback }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "clarify",
            "Useful for when you need to ask the user a question to clarify their request. \
             Input is a single question for the user. Output is the user's response.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "clarification": {
                        "type": "string",
                        "description": "A question or prompt for the user"
                    }
                },
                "required": ["clarification"]
            }),
        )
    }
}

#[async_trait]
impl Tool for ClarifyTool {
    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let question = opt_str_arg(&input, "clarification")
            .unwrap_or("Could you clarify your request?")
            .to_string();
        debug!(question = %question, "Asking the user for clarification");

        // The callback blocks on a human, keep it off the async workers.
        let callback = self.callback.clone();
        let reply = tokio::task::spawn_blocking(move || callback(&question))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("clarification prompt failed: {e}")))?;

        Ok(ToolOutput::Text(reply))
    }
}
