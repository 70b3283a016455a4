//! Workspace management for tabrecon operations

use crate::combination::CombinationMode;
use crate::error::{ReconError, Result};
use crate::session::SessionName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const WORKSPACE_DIR: &str = ".tabrecon";
const CONFIG_FILE: &str = "config.json";
const STORE_EXTENSION: &str = "duckdb";

/// Manages the .tabrecon workspace directory
#[derive(Debug, Clone)]
pub struct ReconWorkspace {
    /// Project root directory (where .tabrecon/ lives)
    pub root: PathBuf,
    /// .tabrecon/ directory path
    pub recon_dir: PathBuf,
    /// .tabrecon/sessions/ directory path, one store per session
    pub sessions_dir: PathBuf,
    /// .tabrecon/exports/ directory path
    pub exports_dir: PathBuf,
}

/// Settings persisted in `.tabrecon/config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub version: String,
    pub created: DateTime<Utc>,
    /// Combination mode used when setup does not name one
    pub default_mode: CombinationMode,
    /// Upper bound on runs a single setup may materialize
    pub max_runs: u64,
    /// DuckDB `memory_limit` applied to every connection
    pub memory_limit: Option<String>,
    /// DuckDB `threads` applied to every connection
    pub threads: Option<u32>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            version: crate::FORMAT_VERSION.to_string(),
            created: Utc::now(),
            default_mode: CombinationMode::PerRow,
            max_runs: crate::DEFAULT_MAX_RUNS,
            memory_limit: None,
            threads: None,
        }
    }
}

impl ReconWorkspace {
    /// Find existing workspace or create a new one
    pub fn find_or_create(start_dir: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let start = start_dir.unwrap_or(&current_dir);

        if let Some(workspace) = Self::find_existing(start)? {
            return Ok(workspace);
        }

        Self::create_new(start.to_path_buf())
    }

    /// Find existing .tabrecon workspace by walking up directory tree
    fn find_existing(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir;

        loop {
            let recon_dir = current.join(WORKSPACE_DIR);
            if recon_dir.is_dir() {
                return Ok(Some(Self::from_root(current.to_path_buf())));
            }

            // A git checkout marks the project root; don't climb past it
            if current.join(".git").exists() {
                break;
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Ok(None)
    }

    /// Create a new workspace in the specified root directory
    pub fn create_new(root: PathBuf) -> Result<Self> {
        let workspace = Self::from_root(root);

        fs::create_dir_all(&workspace.recon_dir)?;
        fs::create_dir_all(&workspace.sessions_dir)?;
        fs::create_dir_all(&workspace.exports_dir)?;

        workspace.create_config_with_force(false)?;
        workspace.ensure_gitignore()?;

        log::info!("Created tabrecon workspace at: {}", workspace.root.display());

        Ok(workspace)
    }

    /// Create workspace from root directory path
    pub fn from_root(root: PathBuf) -> Self {
        let recon_dir = root.join(WORKSPACE_DIR);
        let sessions_dir = recon_dir.join("sessions");
        let exports_dir = recon_dir.join("exports");

        Self {
            root,
            recon_dir,
            sessions_dir,
            exports_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.recon_dir.join(CONFIG_FILE)
    }

    /// Path of a workspace-level store such as `source`, `target` or `catalog`
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.recon_dir.join(format!("{}.{}", name, STORE_EXTENSION))
    }

    /// Path of the store that holds a session's job and differences tables
    pub fn session_store_path(&self, session: &SessionName) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.{}", session.as_str(), STORE_EXTENSION))
    }

    /// Default location for an exported session artifact
    pub fn export_path(&self, session: &SessionName, extension: &str) -> PathBuf {
        self.exports_dir
            .join(format!("{}.{}", session.as_str(), extension))
    }

    pub fn session_exists(&self, session: &SessionName) -> bool {
        self.session_store_path(session).exists()
    }

    /// List the sessions that have a store in this workspace
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();

        if !self.sessions_dir.exists() {
            return Ok(sessions);
        }

        for entry in WalkDir::new(&self.sessions_dir).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(STORE_EXTENSION) {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    sessions.push(name.to_string());
                }
            }
        }

        sessions.sort();
        Ok(sessions)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_config(&self) -> Result<WorkspaceConfig> {
        let config_path = self.config_path();
        if !config_path.exists() {
            return Ok(WorkspaceConfig::default());
        }

        let content = fs::read_to_string(&config_path)?;
        serde_json::from_str(&content).map_err(|e| {
            ReconError::config(format!(
                "Failed to parse {}: {}",
                config_path.display(),
                e
            ))
        })
    }

    /// Create configuration file with optional force overwrite
    pub fn create_config_with_force(&self, force: bool) -> Result<()> {
        let config_path = self.config_path();

        if config_path.exists() && !force {
            return Ok(());
        }

        let config = WorkspaceConfig::default();
        fs::write(config_path, serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }

    /// Ensure .gitignore keeps store files out of version control
    pub fn ensure_gitignore(&self) -> Result<()> {
        let gitignore_path = self.root.join(".gitignore");
        let entry = "# Ignore reconciliation stores and exports\n.tabrecon/**/*.duckdb*\n.tabrecon/exports/\n";

        if gitignore_path.exists() {
            let content = fs::read_to_string(&gitignore_path)?;
            if !content.contains(".tabrecon/**/*.duckdb*") {
                let new_content = if content.ends_with('\n') {
                    format!("{}\n{}", content, entry)
                } else {
                    format!("{}\n\n{}", content, entry)
                };
                fs::write(gitignore_path, new_content)?;
                log::info!("Updated .gitignore with tabrecon entries");
            }
        } else {
            fs::write(gitignore_path, entry)?;
            log::info!("Created .gitignore with tabrecon entries");
        }

        Ok(())
    }
}
