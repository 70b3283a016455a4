//! Output formatting utilities

use crate::batch::BatchSummary;
use crate::engine::SetupResponse;
use crate::error::Result;
use crate::import::ImportSummary;
use crate::job_state::JobState;
use crate::status::StatusReport;
use crate::store::ColumnInfo;
use std::path::Path;

/// Pretty printer for tabrecon output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print a name list as a tree, or `empty` when there is nothing to show
    pub fn print_list(title: &str, items: &[String], empty: &str) {
        if items.is_empty() {
            println!("{}", empty);
            return;
        }

        println!("{}", title);
        for (i, item) in items.iter().enumerate() {
            println!("{} {}", branch(i, items.len()), item);
        }
    }

    pub fn print_columns(table: &str, columns: &[ColumnInfo]) {
        println!("📋 Columns of '{}':", table);
        for (i, column) in columns.iter().enumerate() {
            let nullable = if column.nullable { "" } else { " NOT NULL" };
            println!(
                "{} {} ({}{})",
                branch(i, columns.len()),
                column.name,
                column.data_type,
                nullable
            );
        }
    }

    pub fn print_import(summary: &ImportSummary, store: &str) {
        let action = if summary.created { "Created" } else { "Appended to" };
        println!(
            "✅ {} table '{}' in {} store ({} rows)",
            action, summary.table, store, summary.rows_loaded
        );
    }

    pub fn print_setup(response: &SetupResponse, session: &str) {
        println!("🧩 Batch created");
        println!("├─ Session: {}", session);
        println!("├─ Batch id: {}", response.batch_id);
        println!("└─ Runs: {}", response.total_combinations);
        println!();
        println!("Next: tabrecon run {}", response.batch_id);
    }

    pub fn print_batch_summary(summary: &BatchSummary) {
        println!("🔍 Batch {}", summary.batch_id);
        println!("├─ Runs compared: {}", summary.processed);
        println!("├─ {} Pass: {}", mark(true), summary.pass);
        println!("├─ {} Fail: {}", mark(summary.fail == 0), summary.fail);
        println!("├─ NoData: {}", summary.no_data);
        println!("└─ {} Error: {}", mark(summary.error == 0), summary.error);
    }

    pub fn print_status(report: &StatusReport) {
        let state = match report.execution_status {
            JobState::InProgress => "⏳ in_progress",
            JobState::Completed => "✅ completed",
            JobState::Failed => "❌ failed",
        };

        println!("📊 Batch {}", report.batch_id);
        println!("├─ Status: {}", state);
        if let Some(error) = &report.last_error {
            println!("│  └─ {}", error);
        }
        println!("├─ Pass: {}", report.counts.pass);
        println!("├─ Fail: {}", report.counts.fail);
        println!("├─ Pending: {}", report.counts.pending);
        println!("├─ Error: {}", report.counts.error);
        println!("├─ NoData: {}", report.counts.no_data);
        println!("└─ Total: {}", report.counts.total());
    }

    pub fn print_export(session: &str, path: &Path, bytes: u64) {
        println!(
            "📦 Exported session '{}' to {} ({})",
            session,
            path.display(),
            format_bytes(bytes)
        );
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }
}

fn branch(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}

/// Format bytes in human-readable format
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
