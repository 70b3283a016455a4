//! Per-batch run counts

use crate::error::Result;
use crate::job_state::JobState;
use crate::session::{self, SessionName};
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};

/// Number of runs in each result state for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pass: u64,
    pub fail: u64,
    /// Runs with no result yet (NULL or blank)
    pub pending: u64,
    pub error: u64,
    pub no_data: u64,
}

impl RunCounts {
    pub fn total(&self) -> u64 {
        self.pass + self.fail + self.pending + self.error + self.no_data
    }
}

/// Answer to a status call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub batch_id: String,
    pub execution_status: JobState,
    #[serde(flatten)]
    pub counts: RunCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Count runs of `batch_id` by result. Read-only.
pub fn count_runs(conn: &Connection, session: &SessionName, batch_id: &str) -> Result<RunCounts> {
    session::require_job_table(conn, session)?;

    let sql = format!(
        "SELECT
             COUNT(CASE WHEN result = 'Pass' THEN 1 END),
             COUNT(CASE WHEN result = 'Fail' THEN 1 END),
             COUNT(CASE WHEN result IS NULL OR result = '' THEN 1 END),
             COUNT(CASE WHEN result = 'Error' THEN 1 END),
             COUNT(CASE WHEN result = 'NoData' THEN 1 END)
         FROM {} WHERE batch_id = ?",
        session.table()
    );

    let counts = conn.query_row(&sql, params![batch_id], |row| {
        Ok(RunCounts {
            pass: row.get::<_, i64>(0)? as u64,
            fail: row.get::<_, i64>(1)? as u64,
            pending: row.get::<_, i64>(2)? as u64,
            error: row.get::<_, i64>(3)? as u64,
            no_data: row.get::<_, i64>(4)? as u64,
        })
    })?;
    Ok(counts)
}
