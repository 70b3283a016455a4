//! Loading CSV, Parquet and JSON files into a store

use crate::error::{ReconError, Result};
use crate::store::{self, quote_literal, Identifier};
use duckdb::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File formats DuckDB can read directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
    Json,
}

impl FileFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            "json" | "jsonl" | "ndjson" => Ok(Self::Json),
            _ => Err(ReconError::invalid_input(format!(
                "Unsupported file type: {} (expected csv, parquet or json)",
                path.display()
            ))),
        }
    }

    fn reader(&self, path: &str, all_varchar: bool) -> String {
        let path = quote_literal(path);
        match self {
            Self::Csv if all_varchar => format!("read_csv_auto({}, all_varchar = true)", path),
            Self::Csv => format!("read_csv_auto({})", path),
            Self::Parquet => format!("read_parquet({})", path),
            Self::Json => format!("read_json_auto({})", path),
        }
    }
}

/// What to load and where
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub file: PathBuf,
    /// Defaults to the file stem with spaces replaced by underscores
    pub table: Option<String>,
    /// Read every CSV column as VARCHAR instead of sniffing types
    pub all_varchar: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub table: String,
    pub rows_loaded: u64,
    pub created: bool,
}

/// Table name for an import when none is given
pub fn default_table_name(file: &Path) -> Result<Identifier> {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ReconError::invalid_input(format!("no file name in {}", file.display())))?;
    Identifier::parse(&stem.trim().replace([' ', '-'], "_"))
}

/// Load `request.file` into `conn`, appending when the table already exists
pub fn import_file(conn: &Connection, request: &ImportRequest) -> Result<ImportSummary> {
    let file = &request.file;
    if !file.is_file() {
        return Err(ReconError::invalid_input(format!(
            "File not found: {}",
            file.display()
        )));
    }

    let format = FileFormat::from_path(file)?;
    let table = match &request.table {
        Some(name) => Identifier::parse(name)?,
        None => default_table_name(file)?,
    };
    let path_str = file
        .to_str()
        .ok_or_else(|| ReconError::invalid_input(format!("non UTF-8 path: {}", file.display())))?;
    let reader = format.reader(path_str, request.all_varchar);

    let before = row_count(conn, &table)?;
    let created = before.is_none();
    let sql = if created {
        format!("CREATE TABLE {} AS SELECT * FROM {}", table.quoted(), reader)
    } else {
        format!("INSERT INTO {} SELECT * FROM {}", table.quoted(), reader)
    };
    log::debug!("Import SQL: {}", sql);
    conn.execute_batch(&sql)
        .map_err(|e| convert_duckdb_error(e, file))?;

    let after = row_count(conn, &table)?.unwrap_or(0);
    let rows_loaded = after - before.unwrap_or(0);
    log::info!(
        "Loaded {} row(s) from {} into '{}'",
        rows_loaded,
        file.display(),
        table
    );

    Ok(ImportSummary {
        table: table.to_string(),
        rows_loaded,
        created,
    })
}

fn row_count(conn: &Connection, table: &Identifier) -> Result<Option<u64>> {
    if !store::table_exists(conn, table.as_str())? {
        return Ok(None);
    }
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.quoted()),
        [],
        |row| row.get(0),
    )?;
    Ok(Some(count as u64))
}

/// Map reader failures to input errors naming the file
fn convert_duckdb_error(error: duckdb::Error, file: &Path) -> ReconError {
    let message = error.to_string();

    if message.contains("CSV Error")
        || message.contains("Could not convert")
        || message.contains("Unterminated quoted field")
    {
        ReconError::invalid_input(format!("Malformed CSV file '{}': {}", file.display(), message))
    } else if message.contains("Malformed JSON") {
        ReconError::invalid_input(format!("Malformed JSON file '{}': {}", file.display(), message))
    } else if message.contains("column") && message.contains("INSERT") {
        ReconError::schema(format!(
            "'{}' does not match the existing table: {}",
            file.display(),
            message
        ))
    } else {
        ReconError::DuckDb(error)
    }
}
