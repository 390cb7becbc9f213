//! Session orchestration: start a lab, evaluate submissions.
//!
//! [`LabRunner`] owns no global state. The catalog, session store and
//! terminal provisioner are handed in at construction and can be swapped for
//! test doubles.
//!
//! Callers must serialize submissions per session; the runner takes no locks.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::params::resolve;
use crate::core::template::{RenderMode, render_with};
use crate::core::types::{ResolvedParameters, SessionStatus};
use crate::error::{LabError, LabResult};
use crate::io::catalog::LabCatalog;
use crate::io::staging::{materialize, staging_dir};
use crate::io::store::{SessionRecord, SessionStore};
use crate::io::terminal::{TerminalConnection, TerminalProvisioner, TerminalRequest};
use crate::lab::LabDefinition;
use crate::validators::{SessionContext, ValidatorRegistry, Verdict, file_exists_targets};

/// Random bytes behind session ids and seeds (hex-encoded to twice this).
const TOKEN_BYTES: usize = 16;

/// A started (or re-hydrated) lab session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub lab_id: String,
    pub seed: String,
    pub parameters: ResolvedParameters,
    /// Rendered artifact bodies. Empty for sessions loaded from the store.
    pub artifacts: BTreeMap<String, String>,
    pub staging_dir: PathBuf,
    pub terminal: Option<TerminalConnection>,
    pub status: SessionStatus,
    pub created_at: String,
}

impl Session {
    /// Rebuild a session from its persisted row.
    ///
    /// Parameters come from the snapshot, never from re-deriving the seed.
    pub fn from_record(record: SessionRecord, staging_root: &Path) -> LabResult<Self> {
        let parameters: ResolvedParameters =
            serde_json::from_str(&record.parameters).map_err(|source| {
                LabError::CorruptSnapshot {
                    session_id: record.id.clone(),
                    source,
                }
            })?;
        let staging_dir = staging_dir(staging_root, &record.id)?;
        Ok(Self {
            session_id: record.id,
            user_id: record.user_id,
            lab_id: record.lab_id,
            seed: record.seed,
            parameters,
            artifacts: BTreeMap::new(),
            staging_dir,
            terminal: None,
            status: record.status,
            created_at: record.created_at,
        })
    }
}

/// Everything a seed determines for one lab, before anything touches disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedLab {
    pub parameters: ResolvedParameters,
    pub artifacts: BTreeMap<String, String>,
    /// Rendered `file_exists` paths that get placeholder files.
    pub placeholders: Vec<String>,
}

/// Resolve parameters and render artifacts and placeholder paths.
pub fn render_lab(lab: &LabDefinition, seed: &str, mode: RenderMode) -> LabResult<RenderedLab> {
    let parameters = resolve(lab, seed)?;
    let artifacts = lab
        .artifacts
        .iter()
        .map(|(name, template)| Ok((name.clone(), render_with(template, &parameters, mode)?)))
        .collect::<LabResult<BTreeMap<_, _>>>()?;
    let placeholders = file_exists_targets(&lab.validators, &parameters, mode)?;
    Ok(RenderedLab {
        parameters,
        artifacts,
        placeholders,
    })
}

pub struct LabRunner<C, S, T> {
    catalog: C,
    store: S,
    terminal: T,
    staging_root: PathBuf,
    registry: ValidatorRegistry,
    render_mode: RenderMode,
}

impl<C, S, T> LabRunner<C, S, T>
where
    C: LabCatalog,
    S: SessionStore,
    T: TerminalProvisioner,
{
    /// Creates `staging_root` if needed. Uses the built-in validators and
    /// permissive rendering.
    pub fn new(
        catalog: C,
        store: S,
        terminal: T,
        staging_root: impl Into<PathBuf>,
    ) -> LabResult<Self> {
        let staging_root = staging_root.into();
        fs::create_dir_all(&staging_root)
            .map_err(|err| LabError::io("create staging root", &staging_root, err))?;
        Ok(Self {
            catalog,
            store,
            terminal,
            staging_root,
            registry: ValidatorRegistry::with_builtins(),
            render_mode: RenderMode::Permissive,
        })
    }

    pub fn with_registry(mut self, registry: ValidatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn list_labs(&self) -> LabResult<Vec<LabDefinition>> {
        Ok(self.catalog.list()?)
    }

    pub fn get_lab(&self, lab_id: &str) -> LabResult<LabDefinition> {
        self.catalog
            .get(lab_id)?
            .ok_or_else(|| LabError::LabNotFound {
                lab_id: lab_id.to_string(),
            })
    }

    /// Render a lab under an explicit seed without creating any state.
    pub fn preview(&self, lab_id: &str, seed: &str) -> LabResult<RenderedLab> {
        let lab = self.get_lab(lab_id)?;
        render_lab(&lab, seed, self.render_mode)
    }

    /// Start a new session of `lab_id` for `user_id`.
    ///
    /// Nothing is persisted unless staging succeeded. A failed persist after
    /// staging leaves the staging directory behind. Terminal provisioning is
    /// best-effort: failures are logged and the session starts without one.
    #[instrument(skip_all, fields(lab_id = %lab_id, user_id = %user_id))]
    pub fn start_lab(&self, lab_id: &str, user_id: &str) -> LabResult<Session> {
        let lab = self.get_lab(lab_id)?;
        let session_id = random_token();
        let seed = random_token();
        let rendered = render_lab(&lab, &seed, self.render_mode)?;
        let staging_dir = materialize(
            &self.staging_root,
            &session_id,
            &rendered.artifacts,
            &rendered.placeholders,
        )?;

        let created_at = chrono::Utc::now().to_rfc3339();
        let record = SessionRecord {
            id: session_id.clone(),
            user_id: user_id.to_string(),
            lab_id: lab.id.clone(),
            seed: seed.clone(),
            parameters: serde_json::to_string(&rendered.parameters)
                .context("serialize parameters")?,
            status: SessionStatus::Running,
            created_at: created_at.clone(),
        };
        self.store.create_session(&record)?;

        let request = TerminalRequest {
            session_id: session_id.clone(),
            working_dir: staging_dir.clone(),
            seed: seed.clone(),
        };
        let terminal = match self.terminal.provision(&request) {
            Ok(connection) => connection,
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    error = %format!("{err:#}"),
                    "terminal provisioning failed"
                );
                None
            }
        };

        info!(session_id = %session_id, terminal = terminal.is_some(), "session started");
        Ok(Session {
            session_id,
            user_id: user_id.to_string(),
            lab_id: lab.id,
            seed,
            parameters: rendered.parameters,
            artifacts: rendered.artifacts,
            staging_dir,
            terminal,
            status: SessionStatus::Running,
            created_at,
        })
    }

    /// Load a persisted session.
    pub fn load_session(&self, session_id: &str) -> LabResult<Session> {
        let record = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| LabError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        Session::from_record(record, &self.staging_root)
    }

    /// Evaluate `submission` and record the verdict.
    pub fn submit(&self, session: &mut Session, submission: &str) -> LabResult<bool> {
        Ok(self.submit_verdict(session, submission)?.passed)
    }

    /// Like [`LabRunner::submit`], returning per-validator outcomes.
    ///
    /// A session is judged once. Errors (unknown validator type, bad
    /// template) leave it `running` so it can be retried after the lab is
    /// fixed.
    #[instrument(skip_all, fields(session_id = %session.session_id, lab_id = %session.lab_id))]
    pub fn submit_verdict(&self, session: &mut Session, submission: &str) -> LabResult<Verdict> {
        if session.status.is_terminal() {
            return Err(LabError::SessionFinished {
                session_id: session.session_id.clone(),
                status: session.status,
            });
        }
        let lab = self.get_lab(&session.lab_id)?;
        let ctx = SessionContext {
            parameters: &session.parameters,
            staging_dir: &session.staging_dir,
            render_mode: self.render_mode,
        };
        let verdict = self.registry.evaluate(&lab.validators, submission, &ctx)?;
        let status = SessionStatus::from_verdict(verdict.passed);
        self.store
            .update_session_status(&session.session_id, status)?;
        session.status = status;
        info!(status = %status, "submission judged");
        Ok(verdict)
    }

    /// Re-hydrate `session_id` from the store and submit against it.
    pub fn submit_by_id(&self, session_id: &str, submission: &str) -> LabResult<Verdict> {
        let mut session = self.load_session(session_id)?;
        debug!(session_id, status = %session.status, "session re-hydrated");
        self.submit_verdict(&mut session, submission)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
