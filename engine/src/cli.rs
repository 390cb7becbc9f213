//! CLI command implementations.
//!
//! Each command returns the process exit code on success.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use lab_engine::core::derive::derive as derive_hex;
use lab_engine::exit_codes;
use lab_engine::io::catalog::{DirCatalog, LabCatalog};
use lab_engine::io::config::{EngineConfig, load_config};
use lab_engine::io::mutate::mutate_binary;
use lab_engine::io::staging::staging_dir;
use lab_engine::io::store::FileSessionStore;
use lab_engine::io::terminal::Terminal;
use lab_engine::session::LabRunner;
use serde::Serialize;
use tracing::{debug, info};

type Runner = LabRunner<DirCatalog, FileSessionStore, Terminal>;

fn open_runner(config: &EngineConfig) -> Result<Runner> {
    let store = FileSessionStore::open(config.sessions_dir())?;
    let runner = LabRunner::new(
        DirCatalog::new(&config.labs_dir),
        store,
        Terminal::from_config(&config.terminal),
        &config.staging_dir,
    )?
    .with_render_mode(config.render_mode());
    Ok(runner)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

pub fn list_labs(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let labs = DirCatalog::new(&config.labs_dir).list()?;
    for lab in labs {
        println!("{}\t{}\t{}", lab.id, lab.difficulty, lab.title);
    }
    Ok(exit_codes::OK)
}

pub fn start(config_path: &Path, lab_id: &str, user_id: &str) -> Result<i32> {
    let config = load_config(config_path)?;
    let session = open_runner(&config)?.start_lab(lab_id, user_id)?;
    print_json(&session)?;
    Ok(exit_codes::OK)
}

pub fn submit(config_path: &Path, session_id: &str, submission: &str) -> Result<i32> {
    let config = load_config(config_path)?;
    let verdict = open_runner(&config)?.submit_by_id(session_id, submission)?;
    for outcome in &verdict.outcomes {
        debug!(kind = %outcome.kind, passed = outcome.passed, "validator outcome");
    }
    println!("passed={}", verdict.passed);
    Ok(if verdict.passed {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

pub fn preview(config_path: &Path, lab_id: &str, seed: &str) -> Result<i32> {
    let config = load_config(config_path)?;
    let rendered = open_runner(&config)?.preview(lab_id, seed)?;
    print_json(&rendered)?;
    Ok(exit_codes::OK)
}

pub fn derive(seed: &str, name: &str, length: usize) -> Result<i32> {
    if length == 0 {
        bail!("--length must be > 0");
    }
    println!("{}", derive_hex(seed, name, length));
    Ok(exit_codes::OK)
}

pub fn mutate(input: &Path, output: &Path, seed: &str) -> Result<i32> {
    mutate_binary(input, output, seed)?;
    println!("mutate: input={} output={}", input.display(), output.display());
    Ok(exit_codes::OK)
}

/// Remove a session's staging directory. Stored session rows are kept.
pub fn clean(config_path: &Path, session_id: &str) -> Result<i32> {
    let config = load_config(config_path)?;
    let dir = staging_dir(&config.staging_dir, session_id)?;
    let removed = dir.exists();
    if removed {
        fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
        info!(session_id, "staging removed");
    }
    println!(
        "clean: session={} staging={} removed={}",
        session_id,
        dir.display(),
        removed
    );
    Ok(exit_codes::OK)
}
