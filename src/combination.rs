//! Primary-key combination generation.
//!
//! A setup call enumerates the distinct key tuples of a reference table and
//! writes one pending run per combination into the session's job table, all
//! tagged with a single fresh batch id.
//!
//! Two enumeration modes exist:
//!
//! * [`CombinationMode::PerRow`] yields one run per distinct key tuple.
//! * [`CombinationMode::Combinatorial`] reproduces the legacy behaviour of
//!   choosing every k-subset of the N distinct tuples (k = number of key
//!   columns) and taking the first key value of each chosen tuple, giving
//!   C(N, k) runs. Only useful for reading job tables written that way.

use crate::error::{ReconError, Result};
use crate::session::SessionName;
use crate::store::Identifier;
use duckdb::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

/// One run's primary-key values, in key column order
pub type KeyValues = Vec<Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombinationMode {
    #[default]
    PerRow,
    Combinatorial,
}

impl CombinationMode {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "per-row" | "per_row" | "row" => Ok(Self::PerRow),
            "combinatorial" | "combinations" => Ok(Self::Combinatorial),
            _ => Err(format!(
                "Invalid combination mode: {}. Use 'per-row' or 'combinatorial'",
                s
            )),
        }
    }
}

/// Result of materializing a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedBatch {
    pub batch_id: String,
    pub total_combinations: u64,
}

/// Read the distinct key tuples of the reference table, as text
pub fn distinct_key_rows(
    conn: &Connection,
    table: &Identifier,
    keys: &[Identifier],
) -> Result<Vec<KeyValues>> {
    let select: Vec<String> = keys
        .iter()
        .map(|k| format!("CAST({} AS VARCHAR)", k.quoted()))
        .collect();
    let sql = format!(
        "SELECT DISTINCT {} FROM {} ORDER BY ALL",
        select.join(", "),
        table.quoted()
    );
    log::debug!("Enumerating key tuples: {}", sql);

    let mut stmt = conn.prepare(&sql)?;
    let width = keys.len();
    let rows = stmt.query_map([], |row| {
        (0..width)
            .map(|i| row.get::<_, Option<String>>(i))
            .collect::<std::result::Result<KeyValues, _>>()
    })?;

    let mut tuples = Vec::new();
    for row in rows {
        tuples.push(row?);
    }
    Ok(tuples)
}

/// Number of k-subsets of n items, or `None` on overflow
pub fn binomial(n: u64, k: u64) -> Option<u64> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // acc * (n - i) / (i + 1) stays integral at every step
        acc = acc.checked_mul(u128::from(n - i))? / u128::from(i + 1);
    }
    u64::try_from(acc).ok()
}

/// Lexicographic k-subsets of `0..n`
pub struct KCombinations {
    n: usize,
    indices: Vec<usize>,
    exhausted: bool,
}

impl KCombinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            exhausted: k > n,
        }
    }
}

impl Iterator for KCombinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let current = self.indices.clone();

        let k = self.indices.len();
        // Rightmost position that can still move forward
        match (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.exhausted = true,
        }

        Some(current)
    }
}

/// Turn distinct key tuples into run key values according to `mode`
pub fn expand(
    tuples: Vec<KeyValues>,
    key_count: usize,
    mode: CombinationMode,
    max_runs: u64,
) -> Result<Vec<KeyValues>> {
    let total = match mode {
        CombinationMode::PerRow => tuples.len() as u64,
        CombinationMode::Combinatorial => binomial(tuples.len() as u64, key_count as u64)
            .unwrap_or(u64::MAX),
    };

    if total > max_runs {
        return Err(ReconError::invalid_input(format!(
            "setup would create {} runs, above the configured limit of {}",
            total, max_runs
        )));
    }

    match mode {
        CombinationMode::PerRow => Ok(tuples),
        CombinationMode::Combinatorial => Ok(KCombinations::new(tuples.len(), key_count)
            .map(|combo| {
                combo
                    .into_iter()
                    .map(|i| tuples[i].first().cloned().flatten())
                    .collect()
            })
            .collect()),
    }
}

/// Fresh identifier for a batch of runs
pub fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Insert one pending run per combination under `batch_id`.
///
/// All rows go in one transaction, so a failed setup leaves no partial batch.
pub fn materialize(
    conn: &mut Connection,
    session: &SessionName,
    batch_id: &str,
    keys: &[Identifier],
    combinations: &[KeyValues],
) -> Result<GeneratedBatch> {

    let columns: Vec<String> = keys.iter().map(|k| k.quoted()).collect();
    let placeholders = vec!["?"; keys.len() + 1].join(", ");
    let sql = format!(
        "INSERT INTO {} (batch_id, {}, result) VALUES ({}, NULL)",
        session.table(),
        columns.join(", "),
        placeholders
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&sql)?;
        for combo in combinations {
            let values = std::iter::once(Some(batch_id.to_string())).chain(combo.iter().cloned());
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    log::info!(
        "Created batch {} with {} run(s) in session '{}'",
        batch_id,
        combinations.len(),
        session
    );

    Ok(GeneratedBatch {
        batch_id: batch_id.to_string(),
        total_combinations: combinations.len() as u64,
    })
}
