//! Built-in tool implementations for the agent session.
//!
//! - **Database tools** (`execute_sql`, `show_tables`, `describe_table`,
//!   `load_data`): run against a shared [`SqlEngine`](crate::database::SqlEngine)
//! - **External tools** (`wikidata`, `research`): network round trips
//! - **Host tools** (`clarify`, `terminate`): call back into the embedding
//!   application

pub mod clarify;
pub mod describe;
pub mod load_data;
pub mod research;
pub mod sql;
pub mod terminate;
pub mod wikidata;

pub use clarify::{ClarifyCallback, ClarifyTool};
pub use describe::DescribeTableTool;
pub use load_data::LoadDataTool;
pub use research::ResearchTool;
pub use sql::{clean_sql, ExecuteSqlTool};
pub use terminate::{TerminateCallback, TerminateTool};
pub use wikidata::WikidataTool;
