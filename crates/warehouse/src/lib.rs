//! SQLite-backed [`SqlEngine`](askdb_tool_runtime::SqlEngine) with file and
//! URL loading.

pub mod loader;
pub mod sqlite;

pub use loader::{sanitize_identifier, SourceKind};
pub use sqlite::SqliteWarehouse;
