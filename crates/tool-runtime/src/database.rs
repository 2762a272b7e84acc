//! Database seam used by the SQL tools.
//!
//! The trait is defined here, next to its consumers; `askdb-warehouse`
//! provides the SQLite implementation.

use async_trait::async_trait;
use comfy_table::Table;
use std::fmt;

/// One rendered cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Binary payload; only its length is shown.
    Blob(usize),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Integer(v) => write!(f, "{v}"),
            CellValue::Real(v) => write!(f, "{v}"),
            CellValue::Text(v) => f.write_str(v),
            CellValue::Blob(len) => write!(f, "<{len} bytes>"),
        }
    }
}

/// Rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryOutput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, if any.
    pub fn scalar(&self) -> Option<&CellValue> {
        self.rows.first().and_then(|r| r.first())
    }

    /// Render as a text table, at most `max_rows` rows. Statements without
    /// rows render as `No output`.
    pub fn render(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return "No output".to_string();
        }

        let mut table = Table::new();
        table.set_header(self.columns.clone());
        for row in self.rows.iter().take(max_rows) {
            table.add_row(row.iter().map(ToString::to_string).collect::<Vec<_>>());
        }

        let mut rendered = table.to_string();
        if self.rows.len() > max_rows {
            rendered.push_str(&format!(
                "\n... {} more rows not shown",
                self.rows.len() - max_rows
            ));
        }
        rendered
    }
}

/// A possibly schema-qualified table name such as `chinook.tracks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(String::from),
            name: name.to_string(),
        }
    }

    /// Split `schema.table`; a lone name has no schema. Surrounding quotes
    /// on either part are dropped.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => Self {
                schema: Some(unquote(schema).to_string()),
                name: unquote(name).to_string(),
            },
            _ => Self {
                schema: None,
                name: unquote(raw).to_string(),
            },
        }
    }

    /// SQL identifier form, each part double-quoted.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

fn unquote(part: &str) -> &str {
    part.trim().trim_matches(|c| c == '"' || c == '`' || c == '\'')
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Error text from the engine itself, shown to the model verbatim.
    #[error("{0}")]
    Query(String),
    #[error("Could not load {location}: {reason}")]
    Load { location: String, reason: String },
    #[error("Unsupported data source: {0}")]
    UnsupportedSource(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A local analytical database the SQL tools run against.
///
/// Implementations serialise access internally; the session dispatches at
/// most one call at a time.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Run a single statement and collect its rows.
    async fn query(&self, sql: &str) -> Result<QueryOutput, DatabaseError>;

    /// Load a file or URL into the database. Returns the statements executed.
    async fn load(&self, source: &str) -> Result<Vec<String>, DatabaseError>;

    /// Statement listing `(schema, name, type)` for every table and view.
    fn catalog_query(&self) -> String;

    /// Statement listing column names and types of `table`.
    fn columns_query(&self, table: &TableRef) -> String;
}
