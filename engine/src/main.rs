//! Lab session engine CLI.
//!
//! Reads `engine.toml` (or `--config`) for catalog, staging and state
//! locations, then lists labs, starts sessions and judges submissions.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lab_engine::error::LabError;
use lab_engine::exit_codes;
use lab_engine::io::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(
    name = "lab-engine",
    version,
    about = "Deterministic, seeded lab sessions"
)]
struct Cli {
    /// Engine config file; defaults apply if it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List catalog labs: id, difficulty, title.
    List,
    /// Start a session and print it as JSON.
    Start {
        lab_id: String,
        #[arg(long)]
        user: String,
    },
    /// Judge a submission against a stored session.
    Submit {
        session_id: String,
        submission: String,
    },
    /// Print parameters and artifacts a seed would produce, without staging.
    Preview {
        lab_id: String,
        #[arg(long)]
        seed: String,
    },
    /// Print one derived hex value.
    Derive {
        #[arg(long)]
        seed: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 8)]
        length: usize,
    },
    /// Copy a binary with a seed-specific trailer.
    Mutate {
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        seed: String,
    },
    /// Remove a session's staging directory.
    Clean { session_id: String },
}

fn main() {
    lab_engine::logging::init();
    let args = Cli::parse();
    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            err.downcast_ref::<LabError>()
                .map_or(exit_codes::INVALID, exit_codes::for_error)
        }
    };
    std::process::exit(code);
}

fn run(args: Cli) -> Result<i32> {
    let config = args.config.as_path();
    match args.command {
        Command::List => cli::list_labs(config),
        Command::Start { lab_id, user } => cli::start(config, &lab_id, &user),
        Command::Submit {
            session_id,
            submission,
        } => cli::submit(config, &session_id, &submission),
        Command::Preview { lab_id, seed } => cli::preview(config, &lab_id, &seed),
        Command::Derive { seed, name, length } => cli::derive(&seed, &name, length),
        Command::Mutate {
            input,
            output,
            seed,
        } => cli::mutate(&input, &output, &seed),
        Command::Clean { session_id } => cli::clean(config, &session_id),
    }
}
