pub mod conversation;
pub mod database;
pub mod dispatch;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod tool;
pub mod tools;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use conversation::{AssistantContent, Message, Role, ToolResult, Transcript, TranscriptError};
pub use database::{CellValue, DatabaseError, QueryOutput, SqlEngine, TableRef};
pub use dispatch::{dispatch, Dispatch};
pub use provider::{CompletionGateway, CompletionRequest, LlmError, ToolChoice};
pub use registry::{RegistryError, ResolvedSetup, SetupArgs, SetupValue, ToolBinding, ToolFactory, ToolRegistry};
pub use retry::{RetryPolicy, RetryingGateway};
pub use runtime::{AgentSession, Answer, AnswerPayload, SessionError, SessionOptions, SessionState, TurnOutcome};
pub use tool::{answer_spec, Tool, ToolCall, ToolContext, ToolError, ToolOutput, ToolSpec, ANSWER_TOOL};
