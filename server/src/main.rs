//! Lab server - HTTP API over the lab session engine.

mod error;
mod ethics;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use lab_engine::io::catalog::DirCatalog;
use lab_engine::io::config::{DEFAULT_CONFIG_PATH, load_config};
use lab_engine::io::store::FileSessionStore;
use lab_engine::io::terminal::Terminal;
use lab_engine::session::LabRunner;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::ethics::{EthicsLedger, LEDGER_FILE};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "lab-server")]
#[command(about = "HTTP API for starting labs and judging submissions")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "4000")]
    port: u16,

    /// Engine config file (labs, staging and state directories)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lab_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    info!(
        labs_dir = %config.labs_dir.display(),
        staging_dir = %config.staging_dir.display(),
        terminal = ?config.terminal.mode,
        "starting lab-server"
    );

    let store = FileSessionStore::open(config.sessions_dir())?;
    let runner = LabRunner::new(
        DirCatalog::new(&config.labs_dir),
        store,
        Terminal::from_config(&config.terminal),
        &config.staging_dir,
    )
    .context("create lab runner")?
    .with_render_mode(config.render_mode());
    let ethics = EthicsLedger::open(config.state_dir.join(LEDGER_FILE))?;
    let state = AppState::new(runner, ethics);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
