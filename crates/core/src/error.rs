use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Unknown LLM provider: {0}")]
    UnknownProvider(String),

    #[error("Missing {key} for LLM provider '{provider}'")]
    MissingApiKey { provider: String, key: &'static str },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
