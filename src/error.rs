//! Error types for tabrecon operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("No configuration recorded for batch '{batch_id}'; run setup again")]
    ConfigMissing { batch_id: String },

    #[error("Batch '{batch_id}' is already in progress")]
    ConcurrencyConflict { batch_id: String },

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("{side} table has {count} rows matching the run key, expected at most one")]
    DuplicateMatch { side: String, count: usize },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl ReconError {
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: msg.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn config_missing(batch_id: impl Into<String>) -> Self {
        Self::ConfigMissing {
            batch_id: batch_id.into(),
        }
    }

    pub fn conflict(batch_id: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            batch_id: batch_id.into(),
        }
    }

    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate_match(side: impl Into<String>, count: usize) -> Self {
        Self::DuplicateMatch {
            side: side.into(),
            count,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
