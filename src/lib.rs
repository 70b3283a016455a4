//! # tabrecon
//!
//! Batch reconciliation of a source table against a target table. A setup
//! call turns the distinct primary keys of the source into pending runs; a
//! triggered batch compares each run's source and target rows column by
//! column and records the differences.

pub mod batch;
pub mod cli;
pub mod combination;
pub mod commands;
pub mod comparator;
pub mod duckdb_config;
pub mod engine;
pub mod error;
pub mod export;
pub mod import;
pub mod job_state;
pub mod output;
pub mod progress;
pub mod recorder;
pub mod session;
pub mod status;
pub mod store;
pub mod workspace;

pub use batch::{BatchConfig, BatchHandle, BatchSummary, RunSelection};
pub use combination::CombinationMode;
pub use engine::{ReconEngine, SetupRequest, SetupResponse};
pub use error::{ReconError, Result};
pub use export::ExportFormat;
pub use job_state::JobState;
pub use recorder::RunResult;
pub use status::StatusReport;
pub use workspace::ReconWorkspace;

/// Current format version for tabrecon workspaces
pub const FORMAT_VERSION: &str = "1.0.0";

/// Default upper bound on runs created by one setup
pub const DEFAULT_MAX_RUNS: u64 = 1_000_000;

/// Name of the per-session table holding field differences
pub const DIFFERENCES_TABLE: &str = "differences";
