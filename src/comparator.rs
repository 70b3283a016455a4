//! Row comparison between the source and target stores.
//!
//! For each run the comparator looks up the row matching the run's key
//! values on both sides and compares the two records column by column. The
//! column set and each column's comparison semantics come from the tables'
//! declared schemas.

use crate::combination::KeyValues;
use crate::error::{ReconError, Result};
use crate::store::{quote_ident, ColumnInfo, Identifier};
use duckdb::types::ValueRef;
use duckdb::{params_from_iter, Connection};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a column's values are read for comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Boolean,
    Text,
    /// Fixed-point decimals, read as VARCHAR and compared digit by digit
    Decimal,
    /// Dates, timestamps, nested types and anything else, read as VARCHAR
    Other,
}

impl ColumnKind {
    /// Classify a DuckDB declared type such as `BIGINT` or `DECIMAL(18,3)`
    pub fn classify(data_type: &str) -> Self {
        let upper = data_type.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" => Self::Integer,
            "FLOAT" | "REAL" | "DOUBLE" => Self::Real,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "VARCHAR" | "TEXT" | "STRING" | "CHAR" | "BPCHAR" => Self::Text,
            "DECIMAL" | "NUMERIC" => Self::Decimal,
            _ => Self::Other,
        }
    }

    fn select_expr(&self, column: &str) -> String {
        let quoted = quote_ident(column);
        match self {
            Self::Decimal | Self::Other => format!("CAST({} AS VARCHAR)", quoted),
            _ => quoted,
        }
    }
}

/// A single typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i128),
    /// Single-precision real, compared at f32 precision
    Float(f32),
    Real(f64),
    /// Decimal as DuckDB renders it, e.g. `12.50`
    Decimal(String),
    Text(String),
}

impl FieldValue {
    pub fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Boolean(b) => Self::Bool(b),
            ValueRef::TinyInt(i) => Self::Int(i.into()),
            ValueRef::SmallInt(i) => Self::Int(i.into()),
            ValueRef::Int(i) => Self::Int(i.into()),
            ValueRef::BigInt(i) => Self::Int(i.into()),
            ValueRef::HugeInt(i) => Self::Int(i),
            ValueRef::UTinyInt(i) => Self::Int(i.into()),
            ValueRef::USmallInt(i) => Self::Int(i.into()),
            ValueRef::UInt(i) => Self::Int(i.into()),
            ValueRef::UBigInt(i) => Self::Int(i.into()),
            ValueRef::Float(f) => Self::Float(f),
            ValueRef::Double(f) => Self::Real(f),
            ValueRef::Text(s) => Self::Text(String::from_utf8_lossy(s).to_string()),
            other => Self::Text(format!("{:?}", other)),
        }
    }

    /// Read a value selected for a column of the given kind
    pub fn read(kind: ColumnKind, value: ValueRef<'_>) -> Self {
        match (kind, Self::from_value_ref(value)) {
            (ColumnKind::Decimal, Self::Text(text)) => Self::Decimal(text),
            (_, field) => field,
        }
    }

    /// Exact decimal digits of a numeric value, `None` for NaN and infinities
    fn canonical_number(&self) -> Option<String> {
        match self {
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) if f.is_finite() => canonical_decimal(&f.to_string()),
            Self::Real(f) if f.is_finite() => canonical_decimal(&f.to_string()),
            Self::Decimal(d) => canonical_decimal(d),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some((*f).into()),
            Self::Real(f) => Some(*f),
            Self::Decimal(d) => d.trim().parse().ok(),
            _ => None,
        }
    }

    /// Typed equality.
    ///
    /// Numbers compare by exact value across integer, real and decimal
    /// columns; a single-precision real compares at f32 precision. Text
    /// compared against a number or boolean is parsed first, and NULL only
    /// equals NULL.
    pub fn matches(&self, other: &FieldValue) -> bool {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Null, _) | (_, Null) => false,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Real(a), Real(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Float(a), Real(b)) | (Real(b), Float(a)) => {
                let narrowed = *b as f32;
                narrowed == *a || (a.is_nan() && narrowed.is_nan())
            }
            (Text(a), Text(b)) => a == b,
            (Text(t), Bool(b)) | (Bool(b), Text(t)) => t.trim().eq_ignore_ascii_case(&b.to_string()),
            (Text(t), n) | (n, Text(t)) => match canonical_decimal(t) {
                Some(digits) => n.canonical_number().as_ref() == Some(&digits),
                // Exponent notation and the like
                None => match (t.trim().parse::<f64>(), n.as_f64()) {
                    (Ok(parsed), Some(number)) => parsed == number,
                    _ => false,
                },
            },
            (a, b) => match (a.canonical_number(), b.canonical_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Text form used when persisting a difference
    pub fn display(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Decimal(s) | Self::Text(s) => Some(s.clone()),
        }
    }
}

/// Normalize a plain decimal literal: no leading `+`, no leading zeros in
/// the integer part, no trailing zeros in the fraction, and `0` for negative
/// zero. Returns `None` for anything that is not `[+-]digits[.digits]`.
pub fn canonical_decimal(text: &str) -> Option<String> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }

    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');
    let mut digits = if int_part.is_empty() { "0".to_string() } else { int_part.to_string() };
    if !frac_part.is_empty() {
        digits.push('.');
        digits.push_str(frac_part);
    }

    if negative && digits != "0" {
        digits.insert(0, '-');
    }
    Some(digits)
}

/// Column name to value, in declared column order
pub type Record = IndexMap<String, FieldValue>;

/// One field that differs between source and target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub row_index: usize,
    pub column_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Outcome of comparing one run
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// Both sides had a row; the list is empty when they agree
    Compared(Vec<FieldDifference>),
    /// At least one side had no row for the run's key
    NoData { source_rows: usize, target_rows: usize },
}

/// Compare two records field by field, skipping excluded columns
pub fn diff_records(
    row_index: usize,
    source: &Record,
    target: &Record,
    excluded: &HashSet<String>,
) -> Vec<FieldDifference> {
    source
        .iter()
        .filter(|(column, _)| !excluded.contains(&column.to_ascii_lowercase()))
        .filter_map(|(column, old)| {
            let new = target.get(column).unwrap_or(&FieldValue::Null);
            if old.matches(new) {
                None
            } else {
                Some(FieldDifference {
                    row_index,
                    column_name: column.clone(),
                    old_value: old.display(),
                    new_value: new.display(),
                })
            }
        })
        .collect()
}

/// Fail unless source and target declare the same column names
pub fn check_column_sets(source: &[ColumnInfo], target: &[ColumnInfo]) -> Result<()> {
    let source_names: HashSet<String> = source.iter().map(|c| c.name.to_ascii_lowercase()).collect();
    let target_names: HashSet<String> = target.iter().map(|c| c.name.to_ascii_lowercase()).collect();

    if source_names == target_names {
        return Ok(());
    }

    let mut only_source: Vec<&String> = source_names.difference(&target_names).collect();
    let mut only_target: Vec<&String> = target_names.difference(&source_names).collect();
    only_source.sort();
    only_target.sort();

    Err(ReconError::schema_mismatch(format!(
        "columns only in source: [{}]; columns only in target: [{}]",
        only_source.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
        only_target.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    )))
}

/// Prepared lookup and comparison for every run of one batch
#[derive(Debug, Clone)]
pub struct ComparisonPlan {
    columns: Vec<String>,
    source_kinds: Vec<ColumnKind>,
    target_kinds: Vec<ColumnKind>,
    excluded: HashSet<String>,
    source_query: String,
    target_query: String,
}

impl ComparisonPlan {
    /// Build the plan from both tables' schemas.
    ///
    /// `key_columns` are the job table's key columns; each becomes one
    /// equality term of the lookup predicate.
    pub fn build(
        source_table: &Identifier,
        source_columns: &[ColumnInfo],
        target_table: &Identifier,
        target_columns: &[ColumnInfo],
        key_columns: &[String],
        excluded: &[String],
    ) -> Result<Self> {
        check_column_sets(source_columns, target_columns)?;

        for key in key_columns {
            if !source_columns.iter().any(|c| c.name.eq_ignore_ascii_case(key)) {
                return Err(ReconError::schema(format!(
                    "key column '{}' not found in table '{}'",
                    key, source_table
                )));
            }
        }

        let excluded: HashSet<String> = excluded.iter().map(|c| c.to_ascii_lowercase()).collect();
        for name in &excluded {
            if !source_columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
                log::warn!("Excluded column '{}' is not a column of '{}'", name, source_table);
            }
        }

        let predicate = key_columns
            .iter()
            .map(|k| format!("CAST({} AS VARCHAR) IS NOT DISTINCT FROM ?", quote_ident(k)))
            .collect::<Vec<_>>()
            .join(" AND ");

        let columns: Vec<String> = source_columns.iter().map(|c| c.name.clone()).collect();

        // Target columns are selected in source order so records line up by name
        let source_kinds: Vec<ColumnKind> = source_columns
            .iter()
            .map(|c| ColumnKind::classify(&c.data_type))
            .collect();
        let target_kinds: Vec<ColumnKind> = columns
            .iter()
            .map(|name| {
                let info = target_columns
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
                    .map(|c| c.data_type.as_str())
                    .unwrap_or("VARCHAR");
                ColumnKind::classify(info)
            })
            .collect();
        let select = |kinds: &[ColumnKind]| -> Vec<String> {
            kinds
                .iter()
                .zip(&columns)
                .map(|(kind, name)| kind.select_expr(name))
                .collect()
        };
        let source_select = select(&source_kinds);
        let target_select = select(&target_kinds);

        Ok(Self {
            source_query: format!(
                "SELECT {} FROM {} WHERE {}",
                source_select.join(", "),
                source_table.quoted(),
                predicate
            ),
            target_query: format!(
                "SELECT {} FROM {} WHERE {}",
                target_select.join(", "),
                target_table.quoted(),
                predicate
            ),
            columns,
            source_kinds,
            target_kinds,
            excluded,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fetch both sides for a run and compare them
    pub fn compare(
        &self,
        source: &Connection,
        target: &Connection,
        key_values: &KeyValues,
    ) -> Result<Comparison> {
        let source_rows = self.fetch(source, &self.source_query, &self.source_kinds, key_values)?;
        let target_rows = self.fetch(target, &self.target_query, &self.target_kinds, key_values)?;

        if source_rows.len() > 1 {
            return Err(ReconError::duplicate_match("source", source_rows.len()));
        }
        if target_rows.len() > 1 {
            return Err(ReconError::duplicate_match("target", target_rows.len()));
        }

        match (source_rows.first(), target_rows.first()) {
            (Some(source_record), Some(target_record)) => Ok(Comparison::Compared(diff_records(
                0,
                source_record,
                target_record,
                &self.excluded,
            ))),
            _ => Ok(Comparison::NoData {
                source_rows: source_rows.len(),
                target_rows: target_rows.len(),
            }),
        }
    }

    fn fetch(
        &self,
        conn: &Connection,
        sql: &str,
        kinds: &[ColumnKind],
        key_values: &KeyValues,
    ) -> Result<Vec<Record>> {
        let mut stmt = conn.prepare(sql)?;
        let width = self.columns.len();
        let rows = stmt.query_map(params_from_iter(key_values.iter()), |row| {
            let mut record = Record::with_capacity(width);
            for (i, (column, kind)) in self.columns.iter().zip(kinds).enumerate() {
                record.insert(column.clone(), FieldValue::read(*kind, row.get_ref(i)?));
            }
            Ok(record)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
