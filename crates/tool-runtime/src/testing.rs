//! Test doubles for driving the agent loop without a real LLM.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::conversation::AssistantContent;
use crate::database::{CellValue, DatabaseError, QueryOutput, SqlEngine, TableRef};
use crate::provider::{CompletionGateway, CompletionRequest, LlmError};
use crate::tool::{Tool, ToolCall, ToolContext, ToolError, ToolOutput};

/// A gateway that replays queued replies in order and records every request.
///
/// Once the queue is empty it answers with empty text, which the loop treats
/// as "no tool calls, keep going".
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<AssistantContent, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: AssistantContent) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_text(&self, text: &str) {
        self.push(AssistantContent::text(text));
    }

    /// Queue a reply carrying a single tool call.
    pub fn push_call(&self, id: &str, name: &str, arguments: Value) {
        self.push(AssistantContent::calls(vec![ToolCall::new(
            id,
            name,
            arguments.to_string(),
        )]));
    }

    /// Queue a reply carrying a tool call with raw (possibly malformed) arguments.
    pub fn push_raw_call(&self, id: &str, name: &str, arguments: &str) {
        self.push(AssistantContent::calls(vec![ToolCall::new(id, name, arguments)]));
    }

    pub fn push_error(&self, err: LlmError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantContent, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(AssistantContent::text("")))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Echoes the `message` argument back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let message = crate::tool::str_arg(&input, "message")?;
        Ok(ToolOutput::Text(message.to_string()))
    }
}

/// Always fails with the configured message.
pub struct FailingTool(pub &'static str);

#[async_trait]
impl Tool for FailingTool {
    async fn execute(&self, _input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        Err(ToolError::ExecutionFailed(self.0.to_string()))
    }
}

/// Panics with the configured message.
pub struct PanickingTool(pub &'static str);

#[async_trait]
impl Tool for PanickingTool {
    async fn execute(&self, _input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        panic!("{}", self.0)
    }
}

/// An engine that returns canned rows (or a canned error) and records every
/// statement it was asked to run.
pub struct RecordingEngine {
    output: Result<QueryOutput, String>,
    queries: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn with_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        let output = QueryOutput {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| CellValue::Text(v.to_string())).collect())
                .collect(),
        };
        Self {
            output: Ok(output),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            output: Err(message.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlEngine for RecordingEngine {
    async fn query(&self, sql: &str) -> Result<QueryOutput, DatabaseError> {
        self.queries.lock().unwrap().push(sql.to_string());
        self.output.clone().map_err(DatabaseError::Query)
    }

    async fn load(&self, source: &str) -> Result<Vec<String>, DatabaseError> {
        if source.ends_with(".xlsx") {
            return Err(DatabaseError::UnsupportedSource(source.to_string()));
        }
        let statement = format!("LOAD {source}");
        self.queries.lock().unwrap().push(statement.clone());
        Ok(vec![statement])
    }

    fn catalog_query(&self) -> String {
        "SELECT schema, name, type FROM catalog".to_string()
    }

    fn columns_query(&self, table: &TableRef) -> String {
        format!("COLUMNS {table}")
    }
}
