//! Common test utilities and helpers

use std::fs;
use std::path::{Path, PathBuf};
use tabrecon::store::StoreKind;
use tabrecon::{ReconEngine, ReconWorkspace, Result, SetupRequest};
use tempfile::TempDir;

/// Test fixture manager for creating temporary reconciliation workspaces
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub engine: ReconEngine,
}

impl TestFixture {
    /// Create a new test fixture with initialized workspace and engine
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let workspace = ReconWorkspace::create_new(temp_dir.path().to_path_buf())?;
        let engine = ReconEngine::open(workspace)?;

        Ok(Self { temp_dir, engine })
    }

    /// Create a fixture whose workspace config.json holds `config_json`
    pub fn with_config(config_json: &str) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let workspace = ReconWorkspace::create_new(temp_dir.path().to_path_buf())?;
        fs::write(workspace.config_path(), config_json)?;
        let engine = ReconEngine::open(workspace)?;

        Ok(Self { temp_dir, engine })
    }

    /// Get the root path of the test fixture
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn workspace(&self) -> &ReconWorkspace {
        self.engine.workspace()
    }

    /// Run SQL against the source store
    pub fn source_sql(&self, sql: &str) -> Result<()> {
        self.engine.connect(StoreKind::Source)?.execute_batch(sql)?;
        Ok(())
    }

    /// Run SQL against the target store
    pub fn target_sql(&self, sql: &str) -> Result<()> {
        self.engine.connect(StoreKind::Target)?.execute_batch(sql)?;
        Ok(())
    }

    /// Create the same table in both stores, with different contents
    pub fn create_tables(&self, ddl: &str, source_rows: &str, target_rows: &str) -> Result<()> {
        self.source_sql(ddl)?;
        self.target_sql(ddl)?;
        if !source_rows.is_empty() {
            self.source_sql(source_rows)?;
        }
        if !target_rows.is_empty() {
            self.target_sql(target_rows)?;
        }
        Ok(())
    }

    /// Scalar query against a session store
    pub fn session_count(&self, session: &str, sql: &str) -> Result<i64> {
        let name = tabrecon::session::SessionName::normalize(session)?;
        let conn = self
            .engine
            .stores()
            .connect(&self.workspace().session_store_path(&name))?;
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    }
}

/// Setup request with default mode and no excluded columns
pub fn setup_request(session: &str, table: &str, keys: &[&str]) -> SetupRequest {
    SetupRequest {
        session: session.to_string(),
        source_table: table.to_string(),
        target_table: table.to_string(),
        primary_columns: keys.iter().map(|k| k.to_string()).collect(),
        ..Default::default()
    }
}

/// Helper for running CLI commands in tests
pub struct CliTestRunner {
    temp_dir: TempDir,
}

impl CliTestRunner {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        ReconWorkspace::create_new(temp_dir.path().to_path_buf())?;
        Ok(Self { temp_dir })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Run a tabrecon command and return the result
    pub fn run_command(&self, args: &[&str]) -> Result<()> {
        use clap::Parser;
        use tabrecon::cli::Cli;
        use tabrecon::commands::execute_command;

        let mut cmd_args = vec!["tabrecon"];
        cmd_args.extend(args);

        let cli = Cli::try_parse_from(cmd_args)
            .map_err(|e| tabrecon::ReconError::invalid_input(e.to_string()))?;

        // Without --workspace, commands run against the fixture root
        let workspace_path = cli.workspace.as_deref().or(Some(self.root()));
        execute_command(cli.command, workspace_path)
    }

    /// Run a command and expect it to succeed
    pub fn expect_success(&self, args: &[&str]) {
        if let Err(e) = self.run_command(args) {
            panic!("Command {:?} should succeed: {}", args, e);
        }
    }

    /// Run a command and expect it to fail
    pub fn expect_failure(&self, args: &[&str]) -> tabrecon::ReconError {
        self.run_command(args).expect_err("Command should fail")
    }

    /// Write a file under the fixture root
    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Open an engine on the fixture workspace
    pub fn engine(&self) -> Result<ReconEngine> {
        ReconEngine::open(ReconWorkspace::from_root(self.root().to_path_buf()))
    }
}

/// Sample tables used across tests
pub mod sample_data {
    pub const ORDERS_DDL: &str =
        "CREATE TABLE orders (k VARCHAR, x INTEGER, note VARCHAR, updated_at TIMESTAMP)";

    pub const ORDERS_SOURCE: &str = "INSERT INTO orders VALUES
        ('A', 1, 'same', TIMESTAMP '2024-01-01 00:00:00'),
        ('B', 5, 'same', TIMESTAMP '2024-01-01 00:00:00')";

    pub const ORDERS_TARGET: &str = "INSERT INTO orders VALUES
        ('A', 2, 'same', TIMESTAMP '2024-02-01 00:00:00'),
        ('B', 5, 'same', TIMESTAMP '2024-03-01 00:00:00')";

    pub fn orders_csv() -> Vec<Vec<&'static str>> {
        vec![
            vec!["k", "x"],
            vec!["A", "1"],
            vec!["B", "5"],
        ]
    }
}
