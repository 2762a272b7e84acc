//! `terminate`: end the whole session at the model's request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::tool::{opt_str_arg, Tool, ToolContext, ToolError, ToolOutput, ToolSpec};

/// Host-supplied notification, called with the goodbye message.
pub type TerminateCallback = Arc<dyn Fn(&str) + Send + Sync>;

const DEFAULT_GOODBYE: &str = "Goodbye!";

pub struct TerminateTool {
    callback: TerminateCallback,
}

impl TerminateTool {
    pub fn new(callback: TerminateCallback) -> Self {
        Self { callback }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "terminate",
            "End the session when the user says goodbye or clearly has no further questions",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "A short goodbye message for the user"
                    }
                }
            }),
        )
    }
}

#[async_trait]
impl Tool for TerminateTool {
    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let message = opt_str_arg(&input, "message")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_GOODBYE)
            .to_string();
        info!("Session terminated by the model");
        (self.callback)(&message);
        Ok(ToolOutput::Terminate { message })
    }
}
