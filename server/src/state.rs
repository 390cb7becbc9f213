//! Shared application state for the HTTP server.

use std::sync::Arc;

use lab_engine::io::catalog::DirCatalog;
use lab_engine::io::store::FileSessionStore;
use lab_engine::io::terminal::Terminal;
use lab_engine::session::LabRunner;

use crate::ethics::EthicsLedger;

pub type Runner = LabRunner<DirCatalog, FileSessionStore, Terminal>;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    /// Users who acknowledged the ethics module.
    pub ethics: Arc<EthicsLedger>,
}

impl AppState {
    pub fn new(runner: Runner, ethics: EthicsLedger) -> Self {
        Self {
            runner: Arc::new(runner),
            ethics: Arc::new(ethics),
        }
    }
}
