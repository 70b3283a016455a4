//! Main entry point for tabrecon CLI

use clap::Parser;
use tabrecon::cli::Cli;
use tabrecon::commands::execute_command;
use tabrecon::duckdb_config;

fn main() {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG still overrides the default level
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = duckdb_config::init_duckdb() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = execute_command(cli.command, cli.workspace.as_deref()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
