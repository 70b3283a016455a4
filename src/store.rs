//! Storage adapter: named DuckDB stores, identifier validation and schema
//! introspection.
//!
//! Table and column names can't be bound as statement parameters, so every
//! user-supplied name passes through [`Identifier::parse`] before it is
//! interpolated into SQL, and always appears double-quoted.

use crate::duckdb_config::DuckDbConfig;
use crate::error::{ReconError, Result};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Longest identifier accepted from user input
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated table or column name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Accept `[A-Za-z_][A-Za-z0-9_]*` up to [`MAX_IDENTIFIER_LEN`] characters
    pub fn parse(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let first = chars
            .next()
            .ok_or_else(|| ReconError::invalid_identifier(name, "name is empty"))?;

        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(ReconError::invalid_identifier(
                name,
                "must start with a letter or underscore",
            ));
        }
        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(ReconError::invalid_identifier(
                name,
                format!("character '{}' is not allowed", bad),
            ));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(ReconError::invalid_identifier(
                name,
                format!("longer than {} characters", MAX_IDENTIFIER_LEN),
            ));
        }

        Ok(Self(name.to_string()))
    }

    /// Parse a list of names, rejecting duplicates
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        let mut parsed: Vec<Self> = Vec::with_capacity(names.len());
        for name in names {
            let ident = Self::parse(name.as_ref())?;
            if parsed.iter().any(|p| p.eq_ignore_case(ident.as_str())) {
                return Err(ReconError::invalid_identifier(
                    ident.as_str(),
                    "listed more than once",
                ));
            }
            parsed.push(ident);
        }
        Ok(parsed)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for SQL text
    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }

    /// DuckDB resolves identifiers case-insensitively
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl TryFrom<String> for Identifier {
    type Error = ReconError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(ident: Identifier) -> Self {
        ident.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote a name read back from the catalog, escaping embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a value for use inside a single-quoted SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The two data stores a reconciliation reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Source,
    Target,
}

impl StoreKind {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "target" => Ok(Self::Target),
            _ => Err(format!("Invalid store: {}. Use 'source' or 'target'", s)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column information for a stored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Keeps one DuckDB database instance per store file and hands out
/// connections to it.
///
/// DuckDB only supports a single open instance per database file, so
/// operations never call `Connection::open` themselves: they ask the
/// registry, which clones a connection off the shared instance. Each clone
/// is private to the operation that requested it.
pub struct StoreRegistry {
    settings: DuckDbConfig,
    databases: Mutex<HashMap<PathBuf, Connection>>,
}

impl StoreRegistry {
    pub fn new(settings: DuckDbConfig) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            databases: Mutex::new(HashMap::new()),
        })
    }

    /// Open (or reuse) the store at `path` and return a fresh connection
    pub fn connect(&self, path: &Path) -> Result<Connection> {
        let mut databases = self
            .databases
            .lock()
            .map_err(|_| ReconError::workspace("store registry lock poisoned"))?;

        if let Some(connection) = databases.get(path) {
            return Ok(connection.try_clone()?);
        }

        log::debug!("Opening store {}", path.display());
        let connection = Connection::open(path)?;
        self.settings.apply(&connection)?;
        let handle = connection.try_clone()?;
        databases.insert(path.to_path_buf(), connection);
        Ok(handle)
    }

    /// Connect to a store that must already exist on disk
    pub fn connect_existing(&self, path: &Path, what: &str) -> Result<Connection> {
        if !path.exists() {
            return Err(ReconError::not_found(format!(
                "{} store at {}",
                what,
                path.display()
            )));
        }
        self.connect(path)
    }
}

/// Check whether a table exists in the store's main schema
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables \
         WHERE table_schema = 'main' AND lower(table_name) = lower(?)",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// List the tables in the store's main schema
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'main' ORDER BY table_name",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut tables = Vec::new();
    for row in rows {
        tables.push(row?);
    }
    Ok(tables)
}

/// Declared columns of a table in ordinal order; empty when the table is absent
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
         WHERE table_schema = 'main' AND lower(table_name) = lower(?) \
         ORDER BY ordinal_position",
    )?;
    let rows = stmt.query_map([table], |row| {
        Ok(ColumnInfo {
            name: row.get::<_, String>(0)?,
            data_type: row.get::<_, String>(1)?,
            nullable: row.get::<_, String>(2)? == "YES",
        })
    })?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

/// Like [`table_columns`] but fails with a schema error for a missing table
pub fn require_columns(conn: &Connection, table: &Identifier, store: &str) -> Result<Vec<ColumnInfo>> {
    let columns = table_columns(conn, table.as_str())?;
    if columns.is_empty() {
        return Err(ReconError::schema(format!(
            "table '{}' not found in {} store",
            table, store
        )));
    }
    Ok(columns)
}

/// Fail with a schema error unless every key column is declared by the table
pub fn require_key_columns(
    columns: &[ColumnInfo],
    keys: &[Identifier],
    table: &Identifier,
) -> Result<()> {
    let missing: Vec<&str> = keys
        .iter()
        .filter(|key| !columns.iter().any(|c| key.eq_ignore_case(&c.name)))
        .map(|key| key.as_str())
        .collect();

    if !missing.is_empty() {
        return Err(ReconError::schema(format!(
            "column(s) {} not found in table '{}'",
            missing.join(", "),
            table
        )));
    }
    Ok(())
}

/// Resolve excluded column names against a table's declared columns.
///
/// Names are matched case-insensitively and returned lowercased. They never
/// reach SQL, so any declared column name is accepted, including ones with
/// spaces that a CSV header produced.
pub fn resolve_excluded_columns(
    columns: &[ColumnInfo],
    requested: &[String],
    table: &Identifier,
) -> Result<Vec<String>> {
    let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
    let mut missing = Vec::new();

    for name in requested {
        let name = name.trim();
        match columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)) {
            Some(column) => {
                let lowered = column.name.to_ascii_lowercase();
                if !resolved.contains(&lowered) {
                    resolved.push(lowered);
                }
            }
            None => missing.push(name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(ReconError::schema(format!(
            "excluded column(s) {} not found in table '{}'",
            missing.join(", "),
            table
        )));
    }
    Ok(resolved)
}
