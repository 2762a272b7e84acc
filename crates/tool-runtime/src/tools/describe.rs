//! `describe_table`: column names and types, row count and a short preview.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::database::{SqlEngine, TableRef};
use crate::tool::{opt_str_arg, str_arg, Tool, ToolContext, ToolError, ToolOutput, ToolSpec};

/// Characters of preview kept in the description.
const PREVIEW_LIMIT: usize = 4000;
const PREVIEW_ROWS: usize = 3;

pub struct DescribeTableTool {
    engine: Arc<dyn SqlEngine>,
}

impl DescribeTableTool {
    pub fn new(engine: Arc<dyn SqlEngine>) -> Self {
        Self { engine }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "describe_table",
            "Show the column names and types of a local database table or view, \
             its row count and the first few rows",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": "The table or view name, optionally qualified as schema.table"
                    },
                    "schema": {
                        "type": "string",
                        "description": "Schema (attached database) holding the table, if not main"
                    }
                },
                "required": ["table"]
            }),
        )
    }

    /// Run one statement, folding any database error into the text.
    async fn run(&self, sql: &str, max_rows: usize) -> String {
        match self.engine.query(sql).await {
            Ok(output) => output.render(max_rows),
            Err(err) => err.to_string(),
        }
    }
}

#[async_trait]
impl Tool for DescribeTableTool {
    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let raw = str_arg(&input, "table")?;
        let mut table = TableRef::parse(raw);
        if let Some(schema) = opt_str_arg(&input, "schema").filter(|s| !s.is_empty()) {
            table.schema = Some(schema.to_string());
        }
        debug!(table = %table, "Describing table");

        let columns_query = self.engine.columns_query(&table);
        let count_query = format!("SELECT count(*) FROM {}", table.quoted());
        let preview_query = format!("SELECT * FROM {} LIMIT {PREVIEW_ROWS}", table.quoted());

        let columns = self.run(&columns_query, usize::MAX).await;
        let count = self.run(&count_query, 1).await;
        let preview: String = self
            .run(&preview_query, PREVIEW_ROWS)
            .await
            .chars()
            .take(PREVIEW_LIMIT)
            .collect();

        Ok(ToolOutput::Text(format!(
            "{table}\n{columns}\n{count_query}\n{count}\n{preview_query}\n{preview}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Transcript;
    use crate::testing::RecordingEngine;

    #[tokio::test]
    async fn test_describe_runs_three_queries() {
        let engine = Arc::new(RecordingEngine::with_rows(&["column_name"], &[&["id"]]));
        let tool = DescribeTableTool::new(engine.clone());
        let transcript = Transcript::new();
        let ctx = ToolContext {
            transcript: &transcript,
            verbose: false,
        };

        let out = tool
            .execute(serde_json::json!({"table": "orders", "schema": "shop"}), &ctx)
            .await
            .unwrap();

        assert_eq!(
            engine.queries(),
            vec![
                "COLUMNS shop.orders".to_string(),
                "SELECT count(*) FROM \"shop\".\"orders\"".to_string(),
                "SELECT * FROM \"shop\".\"orders\" LIMIT 3".to_string(),
            ]
        );
        let ToolOutput::Text(text) = out else { panic!("expected text") };
        assert!(text.starts_with("shop.orders\n"));
        assert!(text.contains("SELECT count(*) FROM \"shop\".\"orders\"\n"));
    }

    #[tokio::test]
    async fn test_errors_are_folded_into_description() {
        let engine = Arc::new(RecordingEngine::failing("no such table: ghost"));
        let tool = DescribeTableTool::new(engine);
        let transcript = Transcript::new();
        let ctx = ToolContext {
            transcript: &transcript,
            verbose: false,
        };

        let out = tool
            .execute(serde_json::json!({"table": "ghost"}), &ctx)
            .await
            .unwrap();
        let ToolOutput::Text(text) = out else { panic!("expected text") };
        assert_eq!(text.matches("no such table: ghost").count(), 3);
    }
}
