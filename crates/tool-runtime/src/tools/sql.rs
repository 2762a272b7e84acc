//! `execute_sql` and `show_tables`.
//!
//! Database errors are returned as the tool's text so the model can read the
//! engine's message and fix its query.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::database::SqlEngine;
use crate::tool::{str_arg, Tool, ToolContext, ToolError, ToolOutput, ToolSpec};

/// Rows shown per result before truncation.
pub const MAX_RENDERED_ROWS: usize = 50;

/// Runs one SQL statement. With a fixed query it ignores its arguments,
/// which is how `show_tables` is built.
pub struct ExecuteSqlTool {
    engine: Arc<dyn SqlEngine>,
    fixed_query: Option<String>,
}

impl ExecuteSqlTool {
    pub fn new(engine: Arc<dyn SqlEngine>) -> Self {
        Self {
            engine,
            fixed_query: None,
        }
    }

    pub fn with_fixed_query(engine: Arc<dyn SqlEngine>, query: impl Into<String>) -> Self {
        Self {
            engine,
            fixed_query: Some(query.into()),
        }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "execute_sql",
            "Run a SQL query against the local SQLite database. Use it for accessing data \
             and for any math computation. Check the table exists first.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "A single SQLite dialect SQL statement"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    pub fn show_tables_spec() -> ToolSpec {
        ToolSpec::new(
            "show_tables",
            "Show the locally available database tables and views",
            serde_json::json!({"type": "object", "properties": {}}),
        )
    }
}

#[async_trait]
impl Tool for ExecuteSqlTool {
    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let raw = match &self.fixed_query {
            Some(query) => query.as_str(),
            None => str_arg(&input, "query")?,
        };
        let sql = clean_sql(raw);
        if sql.is_empty() {
            return Err(ToolError::InvalidInput("query is empty".to_string()));
        }

        debug!(sql = %sql, "Executing SQL");
        match self.engine.query(&sql).await {
            Ok(output) => Ok(ToolOutput::Text(output.render(MAX_RENDERED_ROWS))),
            Err(err) => {
                debug!(error = %err, "SQL failed");
                Ok(ToolOutput::Text(err.to_string()))
            }
        }
    }
}

/// Strip markdown fences and backticks and keep only the first statement.
pub fn clean_sql(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the fence's language tag line, e.g. ```sql
        text = rest.split_once('\n').map_or("", |(_, body)| body);
    }
    let text = text.trim_end().trim_end_matches("```").replace('`', "");
    first_statement(&text).trim().to_string()
}

/// Text up to the first `;` outside string literals, quoted identifiers and
/// `--` / `/* */` comments.
fn first_statement(sql: &str) -> &str {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 1;
            }
            b';' => return &sql[..i],
            _ => {}
        }
        i += 1;
    }
    sql
}
