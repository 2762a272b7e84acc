//! `load_data`: pull local files or URLs into the database.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::database::SqlEngine;
use crate::tool::{Tool, ToolContext, ToolError, ToolOutput, ToolSpec};

pub struct LoadDataTool {
    engine: Arc<dyn SqlEngine>,
}

impl LoadDataTool {
    pub fn new(engine: Arc<dyn SqlEngine>) -> Self {
        Self { engine }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "load_data",
            "Load data from one or more local or remote files into the local database. \
             CSV and Parquet files become tables named after the file; SQLite files are attached.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "files": {
                        "type": "array",
                        "description": "File paths or URLs",
                        "items": {
                            "type": "string",
                            "examples": ["data/chinook.sqlite", "https://example.com/prices.csv"]
                        }
                    }
                },
                "required": ["files"]
            }),
        )
    }
}

#[async_trait]
impl Tool for LoadDataTool {
    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let files: Vec<&str> = input
            .get("files")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::InvalidInput("missing required argument: files".to_string()))?
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        if files.is_empty() {
            return Err(ToolError::InvalidInput("no files given".to_string()));
        }

        let mut lines = Vec::new();
        for file in files {
            debug!(source = file, "Loading data");
            match self.engine.load(file).await {
                Ok(statements) => lines.extend(statements),
                Err(err) => {
                    warn!(source = file, error = %err, "Load failed");
                    lines.push(format!("Error: {err}"));
                }
            }
        }
        Ok(ToolOutput::Text(lines.join("\n")))
    }
}
