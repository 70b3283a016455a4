//! Export of runs joined with their differences

use crate::error::{ReconError, Result};
use crate::session::{self, SessionName};
use crate::store::quote_literal;
use duckdb::Connection;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Parquet,
    Json,
}

impl ExportFormat {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown export format '{}' (expected csv, parquet or json)",
                other
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
            Self::Json => "json",
        }
    }

    fn copy_options(&self) -> &'static str {
        match self {
            Self::Csv => "FORMAT CSV, HEADER",
            Self::Parquet => "FORMAT PARQUET",
            Self::Json => "FORMAT JSON",
        }
    }
}

/// Write every run of the session, left-joined with its differences, to `path`.
///
/// Runs without differences appear once with empty difference columns.
/// Differences whose run no longer exists are not exported.
pub fn write_session(
    conn: &Connection,
    session: &SessionName,
    format: ExportFormat,
    path: &Path,
) -> Result<()> {
    session::require_job_table(conn, session)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| ReconError::invalid_input(format!("non UTF-8 export path: {}", path.display())))?;

    let sql = format!(
        "COPY (
             SELECT r.*, d.id AS difference_id, d.row_index, d.column_name,
                    d.old_value, d.new_value
             FROM {} r
             LEFT JOIN {} d ON d.run_id = r.id
             ORDER BY r.id, d.id
         ) TO {} ({})",
        session.table(),
        crate::DIFFERENCES_TABLE,
        quote_literal(path_str),
        format.copy_options()
    );
    log::debug!("Export SQL: {}", sql);
    conn.execute_batch(&sql)?;

    log::info!(
        "Exported session '{}' as {} to {}",
        session,
        format.extension(),
        path.display()
    );
    Ok(())
}
