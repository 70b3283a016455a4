//! Command-line interface for tabrecon

use crate::combination::CombinationMode;
use crate::export::ExportFormat;
use crate::store::StoreKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tabrecon")]
#[command(about = "Batch reconciliation of source and target tables by primary key")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override workspace location
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize tabrecon workspace
    Init {
        /// Overwrite an existing config.json with defaults
        #[arg(long)]
        force: bool,
    },

    /// Load a CSV, Parquet or JSON file into the source or target store
    Import {
        /// Store to load into: "source" or "target"
        #[arg(value_parser = StoreKind::parse)]
        store: StoreKind,

        /// File to load
        file: PathBuf,

        /// Table name (defaults to the file name)
        #[arg(long)]
        table: Option<String>,

        /// Read every CSV column as text
        #[arg(long)]
        all_varchar: bool,
    },

    /// List tables of a store
    Tables {
        /// "source" or "target"
        #[arg(value_parser = StoreKind::parse)]
        store: StoreKind,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty", value_parser = OutputFormat::parse)]
        format: OutputFormat,
    },

    /// List columns of a table
    Columns {
        /// "source" or "target"
        #[arg(value_parser = StoreKind::parse)]
        store: StoreKind,

        table: String,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty", value_parser = OutputFormat::parse)]
        format: OutputFormat,
    },

    /// Create a batch of pending runs for a session
    Setup {
        /// Session name; spaces become underscores
        #[arg(long)]
        session: String,

        /// Table in the source store
        #[arg(long)]
        source: String,

        /// Table in the target store
        #[arg(long)]
        target: String,

        /// Primary key columns, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,

        /// Columns left out of the comparison, comma separated
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Combination mode: "per-row" or "combinatorial" (defaults to the workspace setting)
        #[arg(long, value_parser = CombinationMode::parse)]
        mode: Option<CombinationMode>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare the runs of a batch and record the results
    Run {
        /// Batch id returned by setup
        batch_id: String,

        /// Re-compare every run, not only unresolved ones
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show run counts of a batch
    Status {
        /// Batch id returned by setup
        batch_id: String,

        /// Session the batch belongs to
        #[arg(long)]
        session: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export every run of a session with its differences
    Export {
        /// Session name
        session: String,

        /// Export format: "csv", "parquet" or "json"
        #[arg(long, default_value = "csv", value_parser = ExportFormat::parse)]
        format: ExportFormat,

        /// Output file (defaults to .tabrecon/exports/<session>.<ext>)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List sessions in the workspace
    Sessions {
        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty", value_parser = OutputFormat::parse)]
        format: OutputFormat,
    },
}

/// Parse output format string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}
