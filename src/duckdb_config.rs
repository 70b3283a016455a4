//! DuckDB library discovery and per-connection settings

use crate::error::{ReconError, Result};
use crate::workspace::WorkspaceConfig;
use duckdb::Connection;
use std::env;
use std::path::{Path, PathBuf};

/// Settings applied to every store connection the engine opens
#[derive(Debug, Clone, Default)]
pub struct DuckDbConfig {
    pub memory_limit: Option<String>,
    pub threads: Option<u32>,
}

impl DuckDbConfig {
    /// Build connection settings from workspace configuration
    pub fn from_workspace(config: &WorkspaceConfig) -> Self {
        Self {
            memory_limit: config.memory_limit.clone(),
            threads: config.threads,
        }
    }

    /// Validate settings before any connection is opened.
    ///
    /// `SET` statements can't take bound parameters, so the memory limit is
    /// restricted to a number followed by a unit.
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = &self.memory_limit {
            let digits = limit.chars().take_while(|c| c.is_ascii_digit()).count();
            let unit = &limit[digits..];
            let unit_ok = matches!(
                unit.to_ascii_uppercase().as_str(),
                "KB" | "MB" | "GB" | "TB" | "KIB" | "MIB" | "GIB" | "TIB"
            );
            if digits == 0 || !unit_ok {
                return Err(ReconError::config(format!(
                    "Invalid memory_limit '{}': expected a value such as '512MB' or '4GB'",
                    limit
                )));
            }
        }

        if self.threads == Some(0) {
            return Err(ReconError::config("threads must be greater than 0"));
        }

        Ok(())
    }

    /// Apply settings to a freshly opened connection
    pub fn apply(&self, connection: &Connection) -> Result<()> {
        if let Some(limit) = &self.memory_limit {
            connection.execute_batch(&format!("SET memory_limit='{}'", limit))?;
        }
        if let Some(threads) = self.threads {
            connection.execute_batch(&format!("SET threads={}", threads))?;
        }
        Ok(())
    }
}

/// Verify a usable DuckDB is available and log where it comes from
pub fn init_duckdb() -> Result<()> {
    if cfg!(feature = "bundled") {
        log::debug!("Using bundled DuckDB library");
        return Ok(());
    }

    match discover_library_path() {
        Some(path) => {
            log::debug!("Using DuckDB library from: {}", path.display());
            Ok(())
        }
        None => Err(ReconError::config(
            "DuckDB library not found. Install libduckdb, set DUCKDB_LIB_PATH, \
             or rebuild with --features bundled",
        )),
    }
}

fn discover_library_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("DUCKDB_LIB_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    standard_paths().into_iter().find(|p| has_duckdb_library(p))
}

fn standard_paths() -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(target_os = "macos") {
        &["/opt/homebrew/lib", "/usr/local/lib", "/opt/local/lib"]
    } else if cfg!(target_os = "windows") {
        &["C:\\Program Files\\DuckDB\\lib", "C:\\duckdb\\lib"]
    } else {
        &[
            "/usr/lib",
            "/usr/local/lib",
            "/usr/lib/x86_64-linux-gnu",
            "/usr/lib64",
        ]
    };
    dirs.iter().map(PathBuf::from).collect()
}

fn has_duckdb_library(path: &Path) -> bool {
    let names: &[&str] = if cfg!(target_os = "windows") {
        &["duckdb.dll", "libduckdb.dll"]
    } else if cfg!(target_os = "macos") {
        &["libduckdb.dylib", "libduckdb.so"]
    } else {
        &["libduckdb.so", "libduckdb.so.1"]
    };
    path.exists() && names.iter().any(|name| path.join(name).exists())
}
