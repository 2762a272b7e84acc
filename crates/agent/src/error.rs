use askdb_core::ConfigError;
use askdb_tool_runtime::{DatabaseError, LlmError, RegistryError, SessionError};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("tool setup error: {0}")]
    Setup(#[from] RegistryError),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Session(#[from] SessionError),
    /// A one-shot question ended without an answer.
    #[error("session terminated: {0}")]
    Terminated(String),
}
