use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::conversation::Transcript;

/// Name of the terminal protocol tool. It has no implementation; the
/// dispatcher short-circuits it and the session treats it as the final answer.
pub const ANSWER_TOOL: &str = "answer";

/// Describes a tool's interface for LLM consumption.
/// Maps to OpenAI's function format and Claude's tool format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool name (e.g., "execute_sql", "describe_table")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the accepted arguments
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Names listed in the schema's `required` array.
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Specification of the terminal `answer` tool.
pub fn answer_spec() -> ToolSpec {
    ToolSpec::new(
        ANSWER_TOOL,
        "Respond to the user with the final answer. Call this once you have enough \
         information; it ends the turn.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Short, direct answer to the user's question"
                },
                "detail": {
                    "type": "string",
                    "description": "Supporting detail, caveats and how the answer was found"
                },
                "query": {
                    "type": "string",
                    "description": "Optional SQL query that reproduces the answer"
                }
            },
            "required": ["summary", "detail"]
        }),
    )
}

/// Represents an LLM requesting execution of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this invocation (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Raw argument text as produced by the model; expected to be a JSON object
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// A call authored by the runtime itself rather than the model.
    pub fn synthetic(name: impl Into<String>) -> Self {
        Self::new(
            format!("call_{}", uuid::Uuid::new_v4().simple()),
            name,
            "{}",
        )
    }
}

/// What a tool hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Ordinary observation fed back to the model.
    Text(String),
    /// Deliberate end of the whole session; never converted into error text.
    Terminate { message: String },
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

/// Context passed to tool execution.
pub struct ToolContext<'a> {
    /// Transcript as it stood when the call was dispatched.
    pub transcript: &'a Transcript,
    pub verbose: bool,
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async. The specification a tool is
/// offered under lives in the registry, so one implementation can back
/// several specs (`show_tables` is `execute_sql` with a pinned query).
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the tool with the parsed JSON arguments (always an object).
    async fn execute(&self, input: Value, context: &ToolContext<'_>) -> Result<ToolOutput, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fetch a required string argument.
pub fn str_arg<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidInput(format!("missing required argument: {key}")))
}

/// Fetch an optional string argument; JSON null counts as absent.
pub fn opt_str_arg<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(|v| v.as_str())
}
