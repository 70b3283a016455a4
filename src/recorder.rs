//! Persistence of comparison outcomes

use crate::comparator::{Comparison, FieldDifference};
use crate::error::Result;
use crate::session::SessionName;
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a run's `result` column once it has been processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunResult {
    Pass,
    Fail,
    /// Source or target had no row for the run's key
    NoData,
    /// The comparison itself failed
    Error,
}

impl RunResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::NoData => "NoData",
            Self::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pass" => Some(Self::Pass),
            "Fail" => Some(Self::Fail),
            "NoData" => Some(Self::NoData),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What gets written for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub result: RunResult,
    pub differences: Vec<FieldDifference>,
}

impl From<Comparison> for RunOutcome {
    fn from(comparison: Comparison) -> Self {
        match comparison {
            Comparison::Compared(differences) if differences.is_empty() => Self {
                result: RunResult::Pass,
                differences,
            },
            Comparison::Compared(differences) => Self {
                result: RunResult::Fail,
                differences,
            },
            Comparison::NoData { .. } => Self {
                result: RunResult::NoData,
                differences: Vec::new(),
            },
        }
    }
}

/// Replace a run's differences and set its result in one transaction.
///
/// Existing differences for the run are deleted first, so recording the
/// same run again never duplicates rows.
pub fn record(
    conn: &mut Connection,
    session: &SessionName,
    run_id: i64,
    outcome: &RunOutcome,
) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute(
        &format!("DELETE FROM {} WHERE run_id = ?", crate::DIFFERENCES_TABLE),
        params![run_id],
    )?;

    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} (run_id, row_index, column_name, old_value, new_value) \
             VALUES (?, ?, ?, ?, ?)",
            crate::DIFFERENCES_TABLE
        ))?;
        for diff in &outcome.differences {
            insert.execute(params![
                run_id,
                diff.row_index as i64,
                diff.column_name,
                diff.old_value,
                diff.new_value
            ])?;
        }
    }

    tx.execute(
        &format!("UPDATE {} SET result = ? WHERE id = ?", session.table()),
        params![outcome.result.as_str(), run_id],
    )?;

    tx.commit()?;

    log::debug!(
        "Run {} in '{}' recorded as {} with {} difference(s)",
        run_id,
        session,
        outcome.result,
        outcome.differences.len()
    );
    Ok(())
}

/// Mark a run whose comparison failed; earlier differences are cleared
pub fn mark_error(conn: &mut Connection, session: &SessionName, run_id: i64) -> Result<()> {
    record(
        conn,
        session,
        run_id,
        &RunOutcome {
            result: RunResult::Error,
            differences: Vec::new(),
        },
    )
}

/// Count persisted differences for a run
pub fn difference_count(conn: &Connection, run_id: i64) -> Result<i64> {
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE run_id = ?", crate::DIFFERENCES_TABLE),
        params![run_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
