//! Library entry point tying stores, sessions and batches together

use crate::batch::{BatchConfig, BatchHandle, BatchRunner, BatchSummary, RunSelection};
use crate::combination::{self, CombinationMode, KeyValues};
use crate::comparator::ComparisonPlan;
use crate::duckdb_config::DuckDbConfig;
use crate::error::{ReconError, Result};
use crate::export::{self, ExportFormat};
use crate::import::{self, ImportRequest, ImportSummary};
use crate::job_state::{JobState, JobStateTracker};
use crate::session::{self, SessionName};
use crate::status::{self, StatusReport};
use crate::store::{self, ColumnInfo, Identifier, StoreKind, StoreRegistry};
use crate::workspace::{ReconWorkspace, WorkspaceConfig};
use chrono::Utc;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::thread;

const CATALOG_STORE: &str = "catalog";

/// Parameters of a setup call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupRequest {
    pub session: String,
    pub source_table: String,
    pub target_table: String,
    pub primary_columns: Vec<String>,
    #[serde(default)]
    pub excluded_columns: Vec<String>,
    /// Falls back to the workspace's `default_mode`
    #[serde(default)]
    pub mode: Option<CombinationMode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupResponse {
    pub batch_id: String,
    pub total_combinations: u64,
}

/// Reconciliation engine over one workspace.
///
/// Every call opens its own connections through the shared
/// [`StoreRegistry`]; triggered batches run on a background thread and
/// report through the [`JobStateTracker`].
pub struct ReconEngine {
    workspace: ReconWorkspace,
    config: WorkspaceConfig,
    stores: Arc<StoreRegistry>,
    jobs: Arc<JobStateTracker>,
    show_progress: bool,
}

impl ReconEngine {
    /// Open the engine and fail batches a previous process left running
    pub fn open(workspace: ReconWorkspace) -> Result<Self> {
        std::fs::create_dir_all(&workspace.sessions_dir)?;
        std::fs::create_dir_all(&workspace.exports_dir)?;

        let config = workspace.load_config()?;
        let stores = Arc::new(StoreRegistry::new(DuckDbConfig::from_workspace(&config))?);
        let jobs = Arc::new(JobStateTracker::open(
            Arc::clone(&stores),
            workspace.store_path(CATALOG_STORE),
        )?);
        jobs.recover_interrupted()?;

        Ok(Self {
            workspace,
            config,
            stores,
            jobs,
            show_progress: false,
        })
    }

    /// Show a progress bar while batches run
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn workspace(&self) -> &ReconWorkspace {
        &self.workspace
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    pub fn jobs(&self) -> &JobStateTracker {
        &self.jobs
    }

    /// Connection to the source or target store
    pub fn connect(&self, kind: StoreKind) -> Result<Connection> {
        self.stores.connect(&self.workspace.store_path(kind.name()))
    }

    fn catalog(&self) -> Result<Connection> {
        self.stores
            .connect(&self.workspace.store_path(CATALOG_STORE))
    }

    /// Validate the request, then write one pending run per key combination.
    ///
    /// Every check happens before the session store is touched, so a
    /// rejected setup leaves no runs behind.
    pub fn setup(&self, request: &SetupRequest) -> Result<SetupResponse> {
        let session = SessionName::normalize(&request.session)?;
        let source_table = Identifier::parse(&request.source_table)?;
        let target_table = Identifier::parse(&request.target_table)?;
        let keys = session::validate_key_columns(&request.primary_columns)?;
        let mode = request.mode.unwrap_or(self.config.default_mode);

        let source = self.connect(StoreKind::Source)?;
        let target = self.connect(StoreKind::Target)?;
        let source_columns = store::require_columns(&source, &source_table, "source")?;
        let target_columns = store::require_columns(&target, &target_table, "target")?;
        store::require_key_columns(&source_columns, &keys, &source_table)?;
        store::require_key_columns(&target_columns, &keys, &target_table)?;
        let excluded = store::resolve_excluded_columns(
            &source_columns,
            &request.excluded_columns,
            &source_table,
        )?;

        let key_names: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
        ComparisonPlan::build(
            &source_table,
            &source_columns,
            &target_table,
            &target_columns,
            &key_names,
            &excluded,
        )?;

        let tuples = combination::distinct_key_rows(&source, &source_table, &keys)?;
        let combinations =
            combination::expand(tuples, keys.len(), mode, self.config.max_runs)?;

        // The snapshot goes in first so committed runs always have a config
        let batch = BatchConfig {
            batch_id: combination::new_batch_id(),
            session,
            source_table,
            target_table,
            primary_columns: keys,
            excluded_columns: excluded,
            mode,
            total_runs: combinations.len() as u64,
            created_at: Utc::now(),
        };
        let catalog = self.catalog()?;
        batch.save(&catalog)?;

        match self.write_runs(&batch, &combinations) {
            Ok(total_combinations) => Ok(SetupResponse {
                batch_id: batch.batch_id,
                total_combinations,
            }),
            Err(e) => {
                if let Err(discard_err) = BatchConfig::discard(&catalog, &batch.batch_id) {
                    log::error!(
                        "Could not discard config of batch {}: {}",
                        batch.batch_id,
                        discard_err
                    );
                }
                Err(e)
            }
        }
    }

    fn write_runs(&self, batch: &BatchConfig, combinations: &[KeyValues]) -> Result<u64> {
        let mut session_conn = self
            .stores
            .connect(&self.workspace.session_store_path(&batch.session))?;
        session::ensure_tables(&session_conn, &batch.session, &batch.primary_columns)?;
        let generated = combination::materialize(
            &mut session_conn,
            &batch.session,
            &batch.batch_id,
            &batch.primary_columns,
            combinations,
        )?;
        Ok(generated.total_combinations)
    }

    /// Start comparing a batch in the background and return immediately
    pub fn trigger(&self, batch_id: &str, selection: RunSelection) -> Result<BatchHandle> {
        let config = self
            .batch_config(batch_id)?
            .ok_or_else(|| ReconError::config_missing(batch_id))?;

        self.jobs.begin(batch_id)?;
        log::info!("Triggered batch {} (session '{}')", batch_id, config.session);

        let runner = BatchRunner::new(
            self.workspace.clone(),
            Arc::clone(&self.stores),
            self.show_progress,
        );
        let jobs = Arc::clone(&self.jobs);
        let worker_batch = batch_id.to_string();

        let spawned = thread::Builder::new()
            .name(format!("batch-{}", short_id(batch_id)))
            .spawn(move || {
                let result = runner.run(&config, selection);
                let transition = match &result {
                    Ok(_) => jobs.complete(&worker_batch),
                    Err(e) => {
                        log::error!("Batch {} failed: {}", worker_batch, e);
                        jobs.fail(&worker_batch, &e.to_string())
                    }
                };
                if let Err(e) = transition {
                    log::error!("Could not update state of batch {}: {}", worker_batch, e);
                }
                result
            });

        match spawned {
            Ok(handle) => Ok(BatchHandle::new(batch_id.to_string(), handle)),
            Err(e) => {
                self.jobs.fail(batch_id, &e.to_string())?;
                Err(e.into())
            }
        }
    }

    /// Trigger a batch and wait for it to finish
    pub fn run_batch(&self, batch_id: &str, selection: RunSelection) -> Result<BatchSummary> {
        self.trigger(batch_id, selection)?.join()
    }

    /// Run counts and execution state of a batch. Read-only.
    pub fn status(&self, session: &str, batch_id: &str) -> Result<StatusReport> {
        let session = SessionName::normalize(session)?;
        let conn = self
            .stores
            .connect_existing(&self.workspace.session_store_path(&session), "session")?;
        let counts = status::count_runs(&conn, &session, batch_id)?;

        let record = self.jobs.record(batch_id)?;
        let (execution_status, last_error) = match record {
            Some(record) => (record.state, record.error),
            None => (JobState::Failed, None),
        };

        Ok(StatusReport {
            batch_id: batch_id.to_string(),
            execution_status,
            counts,
            last_error,
        })
    }

    /// Write a session export to `path`
    pub fn export_to(&self, session: &str, format: ExportFormat, path: &Path) -> Result<()> {
        let session = SessionName::normalize(session)?;
        let conn = self
            .stores
            .connect_existing(&self.workspace.session_store_path(&session), "session")?;
        export::write_session(&conn, &session, format, path)
    }

    /// Export a session to its default location and return the bytes
    pub fn export(&self, session: &str, format: ExportFormat) -> Result<Vec<u8>> {
        let name = SessionName::normalize(session)?;
        let path = self.workspace.export_path(&name, format.extension());
        self.export_to(session, format, &path)?;
        Ok(std::fs::read(path)?)
    }

    pub fn import(&self, kind: StoreKind, request: &ImportRequest) -> Result<ImportSummary> {
        let conn = self.connect(kind)?;
        import::import_file(&conn, request)
    }

    pub fn list_tables(&self, kind: StoreKind) -> Result<Vec<String>> {
        store::list_tables(&self.connect(kind)?)
    }

    pub fn list_columns(&self, kind: StoreKind, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = Identifier::parse(table)?;
        store::require_columns(&self.connect(kind)?, &table, kind.name())
    }

    pub fn list_sessions(&self) -> Result<Vec<String>> {
        self.workspace.list_sessions()
    }

    pub fn batch_config(&self, batch_id: &str) -> Result<Option<BatchConfig>> {
        BatchConfig::load(&self.catalog()?, batch_id)
    }
}

fn short_id(batch_id: &str) -> &str {
    batch_id.get(..8).unwrap_or(batch_id)
}
