//! Comparison sessions and their job tables

use crate::error::{ReconError, Result};
use crate::store::{self, Identifier};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Columns of a job table that are not primary-key values
pub const RESERVED_COLUMNS: [&str; 3] = ["id", "batch_id", "result"];

/// A normalized session name; doubles as the name of the session's job table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(Identifier);

impl SessionName {
    /// Replace spaces with underscores and validate the result
    pub fn normalize(raw: &str) -> Result<Self> {
        let normalized = raw.trim().replace(' ', "_");
        let ident = Identifier::parse(&normalized)?;
        if ident.eq_ignore_case(crate::DIFFERENCES_TABLE) {
            return Err(ReconError::invalid_identifier(
                raw,
                "collides with the differences table",
            ));
        }
        Ok(Self(ident))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Quoted job table name
    pub fn table(&self) -> String {
        self.0.quoted()
    }

    fn sequence(&self) -> String {
        format!("{}_id_seq", self.0.as_str())
    }
}

impl TryFrom<String> for SessionName {
    type Error = ReconError;

    fn try_from(value: String) -> Result<Self> {
        Self::normalize(&value)
    }
}

impl From<SessionName> for String {
    fn from(session: SessionName) -> Self {
        session.0.into()
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate primary-key column names for a job table
pub fn validate_key_columns<S: AsRef<str>>(names: &[S]) -> Result<Vec<Identifier>> {
    if names.is_empty() {
        return Err(ReconError::invalid_input(
            "at least one primary key column is required",
        ));
    }

    let keys = Identifier::parse_list(names)?;
    if let Some(reserved) = keys
        .iter()
        .find(|k| RESERVED_COLUMNS.iter().any(|r| k.eq_ignore_case(r)))
    {
        return Err(ReconError::invalid_identifier(
            reserved.as_str(),
            "reserved for job table bookkeeping",
        ));
    }
    Ok(keys)
}

/// Create the session's job table and the differences table if missing,
/// then check an existing job table was built for the same keys.
pub fn ensure_tables(conn: &Connection, session: &SessionName, keys: &[Identifier]) -> Result<()> {
    let key_defs: Vec<String> = keys.iter().map(|k| format!("{} VARCHAR", k.quoted())).collect();

    let ddl = format!(
        "CREATE SEQUENCE IF NOT EXISTS {seq};
         CREATE TABLE IF NOT EXISTS {table} (
             id BIGINT PRIMARY KEY DEFAULT nextval('{seq}'),
             batch_id VARCHAR NOT NULL,
             {keys},
             result VARCHAR
         );
         CREATE SEQUENCE IF NOT EXISTS differences_id_seq;
         CREATE TABLE IF NOT EXISTS {differences} (
             id BIGINT PRIMARY KEY DEFAULT nextval('differences_id_seq'),
             run_id BIGINT NOT NULL,
             row_index BIGINT NOT NULL,
             column_name VARCHAR NOT NULL,
             old_value VARCHAR,
             new_value VARCHAR
         );",
        seq = session.sequence(),
        table = session.table(),
        keys = key_defs.join(",\n             "),
        differences = crate::DIFFERENCES_TABLE,
    );
    conn.execute_batch(&ddl)?;

    let existing = key_columns(conn, session)?;
    let matches = existing.len() == keys.len()
        && existing
            .iter()
            .zip(keys)
            .all(|(col, key)| key.eq_ignore_case(col));
    if !matches {
        return Err(ReconError::schema(format!(
            "session '{}' already has a job table keyed on ({}), not ({})",
            session,
            existing.join(", "),
            keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(())
}

/// Primary-key columns of a session's job table, read from its schema
pub fn key_columns(conn: &Connection, session: &SessionName) -> Result<Vec<String>> {
    let columns = store::table_columns(conn, session.as_str())?;
    if columns.is_empty() {
        return Err(ReconError::not_found(format!(
            "job table for session '{}'",
            session
        )));
    }

    Ok(columns
        .into_iter()
        .map(|c| c.name)
        .filter(|name| !RESERVED_COLUMNS.iter().any(|r| r.eq_ignore_ascii_case(name)))
        .collect())
}

/// Fail with `NotFound` unless the session's job table exists
pub fn require_job_table(conn: &Connection, session: &SessionName) -> Result<()> {
    if !store::table_exists(conn, session.as_str())? {
        return Err(ReconError::not_found(format!(
            "job table for session '{}'",
            session
        )));
    }
    Ok(())
}
