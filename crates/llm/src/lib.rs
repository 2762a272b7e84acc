pub mod errors;
pub mod providers;

pub use providers::claude::ClaudeGateway;
pub use providers::create_gateway;
pub use providers::openai::OpenAiGateway;
