//! [`SqlEngine`] over a single pooled SQLite connection.
//!
//! The pool holds exactly one connection that never expires, so in-memory
//! data, attached databases and temp views survive between statements.

use std::str::FromStr;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use askdb_core::config::DatabaseConfig;
use askdb_tool_runtime::database::{quote_ident, quote_literal};
use askdb_tool_runtime::{CellValue, DatabaseError, QueryOutput, SqlEngine, TableRef};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::loader::{ColumnKind, Decoded, Source, SourceKind};

const CATALOG_VIEW: &str = "catalog_tables";
const QUERY_LOG_TABLE: &str = "query_log";

pub struct SqliteWarehouse {
    pool: SqlitePool,
    http: reqwest::Client,
    log_queries: bool,
}

impl SqliteWarehouse {
    /// Open `uri`: `:memory:` for a private in-memory database, a `sqlite:`
    /// URL, or a file path. Files are created if missing.
    pub async fn open(uri: &str) -> Result<Self, DatabaseError> {
        let options = if uri.is_empty() || uri == ":memory:" {
            // Plain `:memory:` filename: the memory open flag would make
            // ATTACH open every file as an empty in-memory database.
            SqliteConnectOptions::new().filename(":memory:")
        } else if uri.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(uri)
                .map_err(|e| open_error(uri, e))?
                .create_if_missing(true)
        } else {
            SqliteConnectOptions::new().filename(uri).create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| open_error(uri, e))?;

        let warehouse = Self {
            pool,
            http: reqwest::Client::new(),
            log_queries: false,
        };
        warehouse.refresh_catalog().await?;
        info!(uri = %uri, "SQLite warehouse opened");
        Ok(warehouse)
    }

    pub async fn in_memory() -> Result<Self, DatabaseError> {
        Self::open(":memory:").await
    }

    /// Open the configured database and enable the query log if requested.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut warehouse = Self::open(&config.uri).await?;
        if config.query_log {
            warehouse.enable_query_log().await?;
        }
        Ok(warehouse)
    }

    /// Record every successful statement in `query_log(query, executed_at)`.
    pub async fn enable_query_log(&mut self) -> Result<(), DatabaseError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {QUERY_LOG_TABLE} (query TEXT NOT NULL, executed_at TEXT NOT NULL)"
        );
        sqlx::query(&sql).execute(&self.pool).await.map_err(query_error)?;
        self.log_queries = true;
        Ok(())
    }

    /// Rebuild the temp catalog view over main and every attached schema.
    async fn refresh_catalog(&self) -> Result<(), DatabaseError> {
        let schemas: Vec<String> = sqlx::query("PRAGMA database_list")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?
            .iter()
            .filter_map(|row| row.try_get_unchecked::<String, _>("name").ok())
            .filter(|name| name != "temp")
            .collect();

        let selects: Vec<String> = schemas
            .iter()
            .map(|schema| {
                format!(
                    "SELECT {} AS schema, name, type FROM {}.sqlite_master \
                     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                     AND name <> {}",
                    quote_literal(schema),
                    quote_ident(schema),
                    quote_literal(QUERY_LOG_TABLE),
                )
            })
            .collect();

        sqlx::query(&format!("DROP VIEW IF EXISTS temp.{CATALOG_VIEW}"))
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        sqlx::query(&format!(
            "CREATE TEMP VIEW {CATALOG_VIEW} AS {}",
            selects.join(" UNION ALL ")
        ))
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        debug!(schemas = schemas.len(), "Catalog view refreshed");
        Ok(())
    }

    async fn log_query(&self, sql: &str) {
        let result = sqlx::query(&format!(
            "INSERT INTO {QUERY_LOG_TABLE} (query, executed_at) VALUES (?, ?)"
        ))
        .bind(sql)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Failed to record query");
        }
    }

    async fn attach(&self, source: &Source) -> Result<Vec<String>, DatabaseError> {
        let path = source.local_path(&self.http).await?;
        let statement = format!(
            "ATTACH DATABASE {} AS {}",
            quote_literal(&path.to_string_lossy()),
            quote_ident(&source.name)
        );
        sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| load_error(source, e))?;
        self.refresh_catalog().await?;
        info!(location = %source.location, alias = %source.name, "Attached database");
        Ok(vec![statement])
    }

    /// Replace table `source.name` with the decoded rows.
    async fn import(&self, source: &Source, decoded: Decoded) -> Result<Vec<String>, DatabaseError> {
        let table = quote_ident(&source.name);
        let kinds: Vec<ColumnKind> = decoded
            .schema
            .fields()
            .iter()
            .map(|f| ColumnKind::for_type(f.data_type()))
            .collect();
        let column_defs: Vec<String> = decoded
            .schema
            .fields()
            .iter()
            .zip(&kinds)
            .map(|(f, kind)| format!("{} {}", quote_ident(f.name()), kind.sql_type()))
            .collect();

        let drop = format!("DROP TABLE IF EXISTS {table}");
        let create = format!("CREATE TABLE {table} ({})", column_defs.join(", "));
        let placeholders = vec!["?"; kinds.len()].join(", ");
        let insert = format!("INSERT INTO {table} VALUES ({placeholders})");

        let mut tx = self.pool.begin().await.map_err(query_error)?;
        sqlx::query(&drop).execute(&mut *tx).await.map_err(query_error)?;
        sqlx::query(&create).execute(&mut *tx).await.map_err(query_error)?;

        for batch in &decoded.batches {
            let columns = batch
                .columns()
                .iter()
                .zip(&kinds)
                .map(|(array, kind)| cast(array, &kind.arrow_type()))
                .collect::<Result<Vec<ArrayRef>, _>>()
                .map_err(|e| load_error(source, e))?;

            for row in 0..batch.num_rows() {
                let mut query = sqlx::query(&insert);
                for (array, kind) in columns.iter().zip(&kinds) {
                    query = bind_cell(query, array, *kind, row);
                }
                query.execute(&mut *tx).await.map_err(query_error)?;
            }
        }
        tx.commit().await.map_err(query_error)?;

        let rows = decoded.num_rows();
        info!(location = %source.location, table = %source.name, rows, "Loaded table");
        Ok(vec![drop, create, format!("{insert} -- {rows} rows")])
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_cell<'q>(query: SqliteQuery<'q>, array: &ArrayRef, kind: ColumnKind, row: usize) -> SqliteQuery<'q> {
    if array.is_null(row) {
        return query.bind(None::<String>);
    }
    match kind {
        ColumnKind::Integer => match array.as_any().downcast_ref::<Int64Array>() {
            Some(a) => query.bind(a.value(row)),
            None => query.bind(None::<i64>),
        },
        ColumnKind::Real => match array.as_any().downcast_ref::<Float64Array>() {
            Some(a) => query.bind(a.value(row)),
            None => query.bind(None::<f64>),
        },
        ColumnKind::Text => match array.as_any().downcast_ref::<StringArray>() {
            Some(a) => query.bind(a.value(row).to_string()),
            None => query.bind(None::<String>),
        },
    }
}

fn decode_row(row: &SqliteRow) -> Vec<CellValue> {
    (0..row.columns().len())
        .map(|i| {
            let Ok(raw) = row.try_get_raw(i) else {
                return CellValue::Null;
            };
            if raw.is_null() {
                return CellValue::Null;
            }
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => row
                    .try_get_unchecked::<i64, _>(i)
                    .map(CellValue::Integer)
                    .unwrap_or(CellValue::Null),
                "REAL" | "NUMERIC" => row
                    .try_get_unchecked::<f64, _>(i)
                    .map(CellValue::Real)
                    .unwrap_or(CellValue::Null),
                "BLOB" => row
                    .try_get_unchecked::<Vec<u8>, _>(i)
                    .map(|b| CellValue::Blob(b.len()))
                    .unwrap_or(CellValue::Null),
                _ => row
                    .try_get_unchecked::<String, _>(i)
                    .map(CellValue::Text)
                    .unwrap_or(CellValue::Null),
            }
        })
        .collect()
}

fn query_error(e: sqlx::Error) -> DatabaseError {
    match e {
        sqlx::Error::Database(db) => DatabaseError::Query(db.message().to_string()),
        other => DatabaseError::Query(other.to_string()),
    }
}

fn open_error(uri: &str, e: impl ToString) -> DatabaseError {
    DatabaseError::Load {
        location: uri.to_string(),
        reason: e.to_string(),
    }
}

fn load_error(source: &Source, e: impl ToString) -> DatabaseError {
    open_error(&source.location, e)
}

#[async_trait]
impl SqlEngine for SqliteWarehouse {
    async fn query(&self, sql: &str) -> Result<QueryOutput, DatabaseError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        if self.log_queries {
            self.log_query(sql).await;
        }

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        Ok(QueryOutput {
            columns,
            rows: rows.iter().map(decode_row).collect(),
        })
    }

    async fn load(&self, location: &str) -> Result<Vec<String>, DatabaseError> {
        let source = Source::resolve(location)?;
        debug!(location = %source.location, kind = ?source.kind, "Loading data source");
        match source.kind {
            SourceKind::Sqlite => self.attach(&source).await,
            SourceKind::Csv | SourceKind::Parquet => {
                let data = source.fetch(&self.http).await?;
                let decoded = source.decode(data)?;
                let statements = self.import(&source, decoded).await?;
                self.refresh_catalog().await?;
                Ok(statements)
            }
        }
    }

    fn catalog_query(&self) -> String {
        format!("SELECT schema, name, type FROM {CATALOG_VIEW} ORDER BY schema, name")
    }

    fn columns_query(&self, table: &TableRef) -> String {
        match &table.schema {
            Some(schema) => format!(
                "SELECT name, type FROM pragma_table_info({}, {})",
                quote_literal(&table.name),
                quote_literal(schema)
            ),
            None => format!(
                "SELECT name, type FROM pragma_table_info({})",
                quote_literal(&table.name)
            ),
        }
    }
}
