//! Batch configuration snapshots and the comparison walk

use crate::combination::{CombinationMode, KeyValues};
use crate::comparator::ComparisonPlan;
use crate::error::{ReconError, Result};
use crate::progress::BatchProgress;
use crate::recorder::{self, RunOutcome, RunResult};
use crate::session::{self, SessionName};
use crate::store::{self, Identifier, StoreKind, StoreRegistry};
use crate::workspace::ReconWorkspace;
use chrono::{DateTime, Utc};
use duckdb::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;

const CONFIGS_TABLE: &str = "batch_configs";

/// Setup parameters frozen at setup time and read back by trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_id: String,
    pub session: SessionName,
    pub source_table: Identifier,
    pub target_table: Identifier,
    pub primary_columns: Vec<Identifier>,
    pub excluded_columns: Vec<String>,
    pub mode: CombinationMode,
    pub total_runs: u64,
    pub created_at: DateTime<Utc>,
}

impl BatchConfig {
    pub fn ensure_table(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 batch_id VARCHAR NOT NULL,
                 session VARCHAR NOT NULL,
                 config VARCHAR NOT NULL,
                 created_at VARCHAR NOT NULL
             )",
            CONFIGS_TABLE
        ))?;
        Ok(())
    }

    pub fn save(&self, conn: &Connection) -> Result<()> {
        Self::ensure_table(conn)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (batch_id, session, config, created_at) VALUES (?, ?, ?, ?)",
                CONFIGS_TABLE
            ),
            params![
                self.batch_id,
                self.session.as_str(),
                serde_json::to_string(self)?,
                self.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Remove the snapshot of a batch whose runs were never written
    pub fn discard(conn: &Connection, batch_id: &str) -> Result<()> {
        Self::ensure_table(conn)?;
        conn.execute(
            &format!("DELETE FROM {} WHERE batch_id = ?", CONFIGS_TABLE),
            params![batch_id],
        )?;
        Ok(())
    }

    pub fn load(conn: &Connection, batch_id: &str) -> Result<Option<Self>> {
        Self::ensure_table(conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT config FROM {} WHERE batch_id = ?",
            CONFIGS_TABLE
        ))?;
        let mut rows = stmt.query_map(params![batch_id], |row| row.get::<_, String>(0))?;

        let json = rows.next().transpose()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// Which runs of a batch a walk visits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunSelection {
    /// Runs without a result, plus runs that errored last time
    #[default]
    Unresolved,
    /// Every run of the batch
    All,
}

/// A run loaded from the job table
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRun {
    pub id: i64,
    pub key_values: KeyValues,
}

/// Totals for one walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub processed: u64,
    pub pass: u64,
    pub fail: u64,
    pub no_data: u64,
    pub error: u64,
}

impl BatchSummary {
    fn count(&mut self, result: RunResult) {
        self.processed += 1;
        match result {
            RunResult::Pass => self.pass += 1,
            RunResult::Fail => self.fail += 1,
            RunResult::NoData => self.no_data += 1,
            RunResult::Error => self.error += 1,
        }
    }
}

/// Load the runs of a batch, keyed on the job table's own key columns
pub fn load_runs(
    conn: &Connection,
    session: &SessionName,
    batch_id: &str,
    selection: RunSelection,
) -> Result<Vec<PendingRun>> {
    let keys = session::key_columns(conn, session)?;
    let select: Vec<String> = keys.iter().map(|k| store::quote_ident(k)).collect();
    let filter = match selection {
        RunSelection::Unresolved => " AND (result IS NULL OR result = '' OR result = 'Error')",
        RunSelection::All => "",
    };
    let sql = format!(
        "SELECT id, {} FROM {} WHERE batch_id = ?{} ORDER BY id",
        select.join(", "),
        session.table(),
        filter
    );

    let mut stmt = conn.prepare(&sql)?;
    let width = keys.len();
    let rows = stmt.query_map(params_from_iter([batch_id]), |row| {
        let id: i64 = row.get(0)?;
        let key_values = (1..=width)
            .map(|i| row.get::<_, Option<String>>(i))
            .collect::<std::result::Result<KeyValues, _>>()?;
        Ok(PendingRun { id, key_values })
    })?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(row?);
    }
    Ok(runs)
}

/// Compare one run and persist the outcome
pub fn compare_and_record(
    plan: &ComparisonPlan,
    source: &Connection,
    target: &Connection,
    session_conn: &mut Connection,
    session: &SessionName,
    run: &PendingRun,
) -> Result<RunResult> {
    let outcome = RunOutcome::from(plan.compare(source, target, &run.key_values)?);
    recorder::record(session_conn, session, run.id, &outcome)?;
    Ok(outcome.result)
}

/// Walks the runs of one batch, one at a time
pub struct BatchRunner {
    workspace: ReconWorkspace,
    stores: Arc<StoreRegistry>,
    show_progress: bool,
}

impl BatchRunner {
    pub fn new(workspace: ReconWorkspace, stores: Arc<StoreRegistry>, show_progress: bool) -> Self {
        Self {
            workspace,
            stores,
            show_progress,
        }
    }

    /// Compare every selected run of the batch.
    ///
    /// Setup-level problems (missing stores, schema drift) fail the whole
    /// walk. A failing run is logged, marked `Error`, and the walk moves on.
    pub fn run(&self, config: &BatchConfig, selection: RunSelection) -> Result<BatchSummary> {
        let source = self
            .stores
            .connect(&self.workspace.store_path(StoreKind::Source.name()))?;
        let target = self
            .stores
            .connect(&self.workspace.store_path(StoreKind::Target.name()))?;
        let mut session_conn = self.stores.connect_existing(
            &self.workspace.session_store_path(&config.session),
            "session",
        )?;

        let source_columns = store::require_columns(&source, &config.source_table, "source")?;
        let target_columns = store::require_columns(&target, &config.target_table, "target")?;
        let key_columns = session::key_columns(&session_conn, &config.session)?;
        let plan = ComparisonPlan::build(
            &config.source_table,
            &source_columns,
            &config.target_table,
            &target_columns,
            &key_columns,
            &config.excluded_columns,
        )?;

        log::debug!("Comparing columns {:?}", plan.columns());

        let runs = load_runs(&session_conn, &config.session, &config.batch_id, selection)?;
        log::info!(
            "Comparing {} run(s) of batch {} in session '{}'",
            runs.len(),
            config.batch_id,
            config.session
        );

        let mut progress = BatchProgress::new(runs.len() as u64, self.show_progress);
        let mut summary = BatchSummary {
            batch_id: config.batch_id.clone(),
            ..Default::default()
        };

        for run in &runs {
            let result = match compare_and_record(
                &plan,
                &source,
                &target,
                &mut session_conn,
                &config.session,
                run,
            ) {
                Ok(result) => result,
                Err(e) => {
                    log::warn!("Run {} ({:?}) failed: {}", run.id, run.key_values, e);
                    if let Err(mark_err) = recorder::mark_error(&mut session_conn, &config.session, run.id) {
                        log::error!("Could not mark run {} as errored: {}", run.id, mark_err);
                    }
                    RunResult::Error
                }
            };
            summary.count(result);
            progress.advance(result);
        }

        progress.finish(&summary);
        Ok(summary)
    }
}

/// Handle to a batch walk running on a background thread
#[derive(Debug)]
pub struct BatchHandle {
    batch_id: String,
    handle: JoinHandle<Result<BatchSummary>>,
}

impl BatchHandle {
    pub(crate) fn new(batch_id: String, handle: JoinHandle<Result<BatchSummary>>) -> Self {
        Self { batch_id, handle }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the walk ends
    pub fn join(self) -> Result<BatchSummary> {
        self.handle.join().map_err(|_| {
            ReconError::Generic(anyhow::anyhow!(
                "worker for batch {} panicked",
                self.batch_id
            ))
        })?
    }
}
