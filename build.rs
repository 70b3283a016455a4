//! Build script for tabrecon - locates a system DuckDB when not bundled

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=DUCKDB_LIB_PATH");

    if env::var("CARGO_FEATURE_BUNDLED").is_ok() {
        return;
    }

    // Release pipelines link against whatever the runner image provides
    if env::var("SKIP_DUCKDB_DETECTION").is_ok() {
        println!("cargo:rustc-link-lib=duckdb");
        return;
    }

    match find_duckdb_library() {
        Some(lib_path) => {
            println!("cargo:rustc-link-search=native={}", lib_path.display());
            println!("cargo:rustc-link-lib=duckdb");
        }
        None => {
            eprintln!("DuckDB library not found.");
            eprintln!("Install libduckdb, set DUCKDB_LIB_PATH, or build with --features bundled");
            panic!("DuckDB library not found");
        }
    }
}

fn find_duckdb_library() -> Option<PathBuf> {
    if let Ok(path) = env::var("DUCKDB_LIB_PATH") {
        let path = PathBuf::from(path);
        if has_duckdb_library(&path) {
            return Some(path);
        }
    }

    if let Some(path) = pkg_config_dir() {
        return Some(path);
    }

    candidate_dirs().into_iter().find(|dir| has_duckdb_library(dir))
}

fn pkg_config_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return None;
    }

    let output = Command::new("pkg-config")
        .args(["--libs-only-L", "duckdb"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .filter_map(|flag| flag.strip_prefix("-L"))
        .map(PathBuf::from)
        .find(|dir| has_duckdb_library(dir))
}

fn candidate_dirs() -> Vec<PathBuf> {
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

fn has_duckdb_library(dir: &Path) -> bool {
    let names: &[&str] = if cfg!(target_os = "windows") {
        &["duckdb.dll", "duckdb.lib"]
    } else if cfg!(target_os = "macos") {
        &["libduckdb.dylib", "libduckdb.a"]
    } else {
        &["libduckdb.so", "libduckdb.so.1", "libduckdb.a"]
    };
    dir.exists() && names.iter().any(|name| dir.join(name).exists())
}
