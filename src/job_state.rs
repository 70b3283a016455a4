//! Batch lifecycle state, persisted in the workspace catalog

use crate::error::{ReconError, Result};
use crate::store::StoreRegistry;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const JOBS_TABLE: &str = "batch_jobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    InProgress,
    Completed,
    /// Also reported for batches that were never triggered
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted lifecycle entry for one triggered batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub batch_id: String,
    pub state: JobState,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tracks batch state across calls and process restarts.
///
/// An entry is created when a batch is triggered and moves to `completed` or
/// `failed` when its walk ends. Lookups for batches without an entry report
/// `failed`.
pub struct JobStateTracker {
    stores: Arc<StoreRegistry>,
    catalog: PathBuf,
    transitions: Mutex<()>,
}

impl JobStateTracker {
    pub fn open(stores: Arc<StoreRegistry>, catalog: PathBuf) -> Result<Self> {
        let conn = stores.connect(&catalog)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 batch_id VARCHAR NOT NULL,
                 state VARCHAR NOT NULL,
                 error VARCHAR,
                 started_at VARCHAR NOT NULL,
                 updated_at VARCHAR NOT NULL
             )",
            JOBS_TABLE
        ))?;

        Ok(Self {
            stores,
            catalog,
            transitions: Mutex::new(()),
        })
    }

    fn connect(&self) -> Result<Connection> {
        self.stores.connect(&self.catalog)
    }

    /// Move a batch to `in_progress`; a batch already running is a conflict
    pub fn begin(&self, batch_id: &str) -> Result<()> {
        let _guard = self
            .transitions
            .lock()
            .map_err(|_| ReconError::workspace("job state lock poisoned"))?;
        let conn = self.connect()?;

        let now = Utc::now().to_rfc3339();
        match read_record(&conn, batch_id)? {
            Some(record) if record.state == JobState::InProgress => {
                Err(ReconError::conflict(batch_id))
            }
            Some(_) => {
                conn.execute(
                    &format!(
                        "UPDATE {} SET state = ?, error = NULL, started_at = ?, updated_at = ? \
                         WHERE batch_id = ?",
                        JOBS_TABLE
                    ),
                    params![JobState::InProgress.as_str(), now, now, batch_id],
                )?;
                Ok(())
            }
            None => {
                conn.execute(
                    &format!(
                        "INSERT INTO {} (batch_id, state, error, started_at, updated_at) \
                         VALUES (?, ?, NULL, ?, ?)",
                        JOBS_TABLE
                    ),
                    params![batch_id, JobState::InProgress.as_str(), now, now],
                )?;
                Ok(())
            }
        }
    }

    pub fn complete(&self, batch_id: &str) -> Result<()> {
        self.finish(batch_id, JobState::Completed, None)
    }

    pub fn fail(&self, batch_id: &str, message: &str) -> Result<()> {
        self.finish(batch_id, JobState::Failed, Some(message))
    }

    fn finish(&self, batch_id: &str, state: JobState, error: Option<&str>) -> Result<()> {
        let _guard = self
            .transitions
            .lock()
            .map_err(|_| ReconError::workspace("job state lock poisoned"))?;
        let conn = self.connect()?;

        let updated = conn.execute(
            &format!(
                "UPDATE {} SET state = ?, error = ?, updated_at = ? WHERE batch_id = ?",
                JOBS_TABLE
            ),
            params![state.as_str(), error, Utc::now().to_rfc3339(), batch_id],
        )?;
        if updated == 0 {
            return Err(ReconError::not_found(format!("job entry for batch '{}'", batch_id)));
        }

        log::info!("Batch {} is {}", batch_id, state);
        Ok(())
    }

    /// Current state, `failed` when the batch was never triggered
    pub fn state(&self, batch_id: &str) -> Result<JobState> {
        Ok(self
            .record(batch_id)?
            .map(|r| r.state)
            .unwrap_or(JobState::Failed))
    }

    pub fn record(&self, batch_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.connect()?;
        read_record(&conn, batch_id)
    }

    /// Fail batches left `in_progress` by a process that no longer runs them.
    ///
    /// Only valid at startup, before this process triggers anything.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let _guard = self
            .transitions
            .lock()
            .map_err(|_| ReconError::workspace("job state lock poisoned"))?;
        let conn = self.connect()?;

        let recovered = conn.execute(
            &format!(
                "UPDATE {} SET state = ?, error = ?, updated_at = ? WHERE state = ?",
                JOBS_TABLE
            ),
            params![
                JobState::Failed.as_str(),
                "interrupted before completion",
                Utc::now().to_rfc3339(),
                JobState::InProgress.as_str()
            ],
        )?;
        if recovered > 0 {
            log::warn!("Marked {} interrupted batch(es) as failed", recovered);
        }
        Ok(recovered)
    }
}

fn read_record(conn: &Connection, batch_id: &str) -> Result<Option<JobRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT state, error, started_at, updated_at FROM {} WHERE batch_id = ?",
        JOBS_TABLE
    ))?;
    let mut rows = stmt.query_map(params![batch_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let row = rows.next().transpose()?;

    let Some((state, error, started_at, updated_at)) = row else {
        return Ok(None);
    };

    let state = JobState::parse(&state)
        .ok_or_else(|| ReconError::workspace(format!("unknown job state '{}'", state)))?;

    Ok(Some(JobRecord {
        batch_id: batch_id.to_string(),
        state,
        error,
        started_at: parse_timestamp(&started_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    }))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ReconError::workspace(format!("bad timestamp '{}': {}", value, e)))
}
