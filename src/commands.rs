//! Command implementations for tabrecon CLI

use crate::batch::RunSelection;
use crate::cli::{Commands, OutputFormat};
use crate::engine::{ReconEngine, SetupRequest};
use crate::error::Result;
use crate::export::ExportFormat;
use crate::import::ImportRequest;
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::create_spinner;
use crate::session::SessionName;
use crate::store::StoreKind;
use crate::workspace::ReconWorkspace;
use std::path::{Path, PathBuf};

/// Execute a command
pub fn execute_command(command: Commands, workspace_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Init { force } => init_command(workspace_path, force),
        Commands::Import {
            store,
            file,
            table,
            all_varchar,
        } => import_command(workspace_path, store, file, table, all_varchar),
        Commands::Tables { store, format } => tables_command(workspace_path, store, format),
        Commands::Columns {
            store,
            table,
            format,
        } => columns_command(workspace_path, store, &table, format),
        Commands::Setup {
            session,
            source,
            target,
            keys,
            exclude,
            mode,
            json,
        } => {
            let request = SetupRequest {
                session,
                source_table: source,
                target_table: target,
                primary_columns: keys,
                excluded_columns: exclude,
                mode,
            };
            setup_command(workspace_path, &request, json)
        }
        Commands::Run {
            batch_id,
            all,
            json,
        } => run_command(workspace_path, &batch_id, all, json),
        Commands::Status {
            batch_id,
            session,
            json,
        } => status_command(workspace_path, &batch_id, &session, json),
        Commands::Export {
            session,
            format,
            output,
        } => export_command(workspace_path, &session, format, output),
        Commands::Sessions { format } => sessions_command(workspace_path, format),
    }
}

fn open_engine(workspace_path: Option<&Path>) -> Result<ReconEngine> {
    let workspace = ReconWorkspace::find_or_create(workspace_path)?;
    ReconEngine::open(workspace)
}

/// Initialize tabrecon workspace
fn init_command(workspace_path: Option<&Path>, force: bool) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let root = workspace_path.unwrap_or(&current_dir);

    // init always targets the given directory, never a parent workspace
    let workspace = ReconWorkspace::create_new(root.to_path_buf())?;
    if force {
        workspace.create_config_with_force(true)?;
    }

    println!("✅ Initialized tabrecon workspace at: {}", workspace.root.display());
    println!("📁 Workspace directory: {}", workspace.recon_dir.display());
    Ok(())
}

fn import_command(
    workspace_path: Option<&Path>,
    store: StoreKind,
    file: PathBuf,
    table: Option<String>,
    all_varchar: bool,
) -> Result<()> {
    let engine = open_engine(workspace_path)?;
    let file = if file.is_absolute() {
        file
    } else {
        std::env::current_dir()?.join(file)
    };

    let spinner = create_spinner(&format!("Loading {}...", file.display()));
    let result = engine.import(
        store,
        &ImportRequest {
            file,
            table,
            all_varchar,
        },
    );
    spinner.finish_and_clear();

    PrettyPrinter::print_import(&result?, store.name());
    Ok(())
}

fn tables_command(workspace_path: Option<&Path>, store: StoreKind, format: OutputFormat) -> Result<()> {
    let engine = open_engine(workspace_path)?;
    let tables = engine.list_tables(store)?;

    match format {
        OutputFormat::Json => println!("{}", JsonFormatter::format(&tables)?),
        OutputFormat::Pretty => PrettyPrinter::print_list(
            &format!("🗄️  Tables in {} store:", store),
            &tables,
            &format!("No tables in {} store.", store),
        ),
    }
    Ok(())
}

fn columns_command(
    workspace_path: Option<&Path>,
    store: StoreKind,
    table: &str,
    format: OutputFormat,
) -> Result<()> {
    let engine = open_engine(workspace_path)?;
    let columns = engine.list_columns(store, table)?;

    match format {
        OutputFormat::Json => println!("{}", JsonFormatter::format(&columns)?),
        OutputFormat::Pretty => PrettyPrinter::print_columns(table, &columns),
    }
    Ok(())
}

fn setup_command(workspace_path: Option<&Path>, request: &SetupRequest, json: bool) -> Result<()> {
    let engine = open_engine(workspace_path)?;
    let response = engine.setup(request)?;

    if json {
        println!("{}", JsonFormatter::format(&response)?);
    } else {
        let session = SessionName::normalize(&request.session)?;
        PrettyPrinter::print_setup(&response, session.as_str());
    }
    Ok(())
}

fn run_command(workspace_path: Option<&Path>, batch_id: &str, all: bool, json: bool) -> Result<()> {
    let engine = open_engine(workspace_path)?.with_progress(!json);
    let selection = if all {
        RunSelection::All
    } else {
        RunSelection::Unresolved
    };

    // The process would exit under a background walk, so wait for it here
    let summary = engine.run_batch(batch_id, selection)?;

    if json {
        println!("{}", JsonFormatter::format(&summary)?);
    } else {
        PrettyPrinter::print_batch_summary(&summary);
    }
    Ok(())
}

fn status_command(workspace_path: Option<&Path>, batch_id: &str, session: &str, json: bool) -> Result<()> {
    let engine = open_engine(workspace_path)?;
    let report = engine.status(session, batch_id)?;

    if json {
        println!("{}", JsonFormatter::format(&report)?);
    } else {
        PrettyPrinter::print_status(&report);
    }
    Ok(())
}

fn export_command(
    workspace_path: Option<&Path>,
    session: &str,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let engine = open_engine(workspace_path)?;
    let path = match output {
        Some(path) => path,
        None => {
            let name = SessionName::normalize(session)?;
            engine.workspace().export_path(&name, format.extension())
        }
    };

    engine.export_to(session, format, &path)?;
    let bytes = std::fs::metadata(&path)?.len();
    PrettyPrinter::print_export(session, &path, bytes);
    Ok(())
}

fn sessions_command(workspace_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let engine = open_engine(workspace_path)?;
    let sessions = engine.list_sessions()?;

    match format {
        OutputFormat::Json => println!("{}", JsonFormatter::format(&sessions)?),
        OutputFormat::Pretty => {
            PrettyPrinter::print_list("🗂️  Sessions:", &sessions, "No sessions found.")
        }
    }
    Ok(())
}
