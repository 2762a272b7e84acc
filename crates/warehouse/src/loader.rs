//! Resolving and decoding data sources for [`SqliteWarehouse::load`].
//!
//! [`SqliteWarehouse::load`]: crate::SqliteWarehouse

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use askdb_tool_runtime::DatabaseError;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

/// Rows sampled for CSV type inference.
const CSV_INFER_RECORDS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Attached as a separate schema.
    Sqlite,
    Csv,
    Parquet,
}

impl SourceKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "db" => Some(Self::Sqlite),
            "csv" => Some(Self::Csv),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// A file or URL classified by extension.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub location: String,
    pub kind: SourceKind,
    /// Sanitised file stem, used as table name or attach alias.
    pub name: String,
    pub remote: bool,
}

impl Source {
    pub fn resolve(location: &str) -> Result<Self, DatabaseError> {
        let location = location.trim();
        let (file_name, remote) = match url::Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let name = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default()
                    .to_string();
                (name, true)
            }
            _ => {
                let name = Path::new(location)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (name, false)
            }
        };

        let path = Path::new(&file_name);
        let kind = path
            .extension()
            .and_then(|ext| SourceKind::from_extension(&ext.to_string_lossy()))
            .ok_or_else(|| DatabaseError::UnsupportedSource(location.to_string()))?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            location: location.to_string(),
            kind,
            name: sanitize_identifier(&stem),
            remote,
        })
    }

    fn load_error(&self, reason: impl ToString) -> DatabaseError {
        DatabaseError::Load {
            location: self.location.clone(),
            reason: reason.to_string(),
        }
    }

    /// Read the raw bytes, downloading remote sources.
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<Bytes, DatabaseError> {
        if !self.remote {
            return Ok(Bytes::from(tokio::fs::read(&self.location).await?));
        }
        debug!(url = %self.location, "Downloading data source");
        let response = client
            .get(&self.location)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.load_error(e))?;
        response.bytes().await.map_err(|e| self.load_error(e))
    }

    /// Local path of a SQLite file; remote files are downloaded to a temp file.
    pub async fn local_path(&self, client: &reqwest::Client) -> Result<PathBuf, DatabaseError> {
        if !self.remote {
            return Ok(PathBuf::from(&self.location));
        }
        let data = self.fetch(client).await?;
        let path = std::env::temp_dir().join(format!(
            "askdb-{}-{}.sqlite",
            self.name,
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::write(&path, &data).await?;
        Ok(path)
    }

    /// Decode a CSV or Parquet payload into record batches.
    pub fn decode(&self, data: Bytes) -> Result<Decoded, DatabaseError> {
        match self.kind {
            SourceKind::Csv => decode_csv(data).map_err(|e| self.load_error(e)),
            SourceKind::Parquet => decode_parquet(data).map_err(|e| self.load_error(e)),
            SourceKind::Sqlite => Err(self.load_error("SQLite files are attached, not decoded")),
        }
    }
}

/// Decoded tabular data.
pub struct Decoded {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl Decoded {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

fn decode_csv(data: Bytes) -> Result<Decoded, arrow::error::ArrowError> {
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(Cursor::new(&data[..]), Some(CSV_INFER_RECORDS))?;
    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(Cursor::new(&data[..]))?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(Decoded { schema, batches })
}

fn decode_parquet(data: Bytes) -> Result<Decoded, parquet::errors::ParquetError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(Decoded { schema, batches })
}

/// SQLite storage class an arrow column is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    pub fn for_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnKind::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => ColumnKind::Real,
            _ => ColumnKind::Text,
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }

    /// Arrow type each column is cast to before binding.
    pub fn arrow_type(self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Real => DataType::Float64,
            ColumnKind::Text => DataType::Utf8,
        }
    }
}

/// Turn a file stem into a safe, unquoted SQL identifier.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if ident.is_empty() {
        ident.push_str("data");
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert_str(0, "t_");
    }
    ident
}
