pub mod agent;
pub mod ask;
pub mod error;
pub mod prompts;
pub mod toolbox;

pub use agent::{Agent, AgentBuilder};
pub use ask::{ask_database, ask_file, ask_wikidata};
pub use error::AgentError;
pub use toolbox::Toolbox;
