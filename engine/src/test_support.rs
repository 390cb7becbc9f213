//! Test-only helpers: lab fixtures, a temporary lab "world", scripted
//! validators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::error::LabResult;
use crate::io::catalog::DirCatalog;
use crate::io::store::{FileSessionStore, MemorySessionStore};
use crate::io::terminal::MockTerminal;
use crate::lab::{LabDefinition, ParameterSpec, ValidatorSpec};
use crate::session::LabRunner;
use crate::validators::{SessionContext, Validator};

/// The `web-sqli-1` lab: one 8-hex flag, checked by content and by file.
pub const SQLI_LAB_YAML: &str = r#"id: web-sqli-1
title: SQL injection basics
difficulty: beginner
seeded: true
topology:
  web: lab-templates/web-sqli
artifacts:
  db_flag_template: "OMNIHACK{{FLAG_ID}}"
parameters:
  - name: FLAG_ID
    type: random_hex
    length: 8
validators:
  - type: flag_contains
    value: "OMNIHACK{{FLAG_ID}}"
  - type: file_exists
    path: /db_flag_template.txt
"#;

/// Minimal lab with no parameters, artifacts or validators.
pub fn lab(id: &str) -> LabDefinition {
    LabDefinition {
        id: id.to_string(),
        title: format!("{id} title"),
        description: String::new(),
        difficulty: String::new(),
        seeded: true,
        topology: Default::default(),
        artifacts: Default::default(),
        parameters: Vec::new(),
        validators: Vec::new(),
        hints: Vec::new(),
        cleanup: false,
    }
}

fn param(name: &str, kind: &str) -> ParameterSpec {
    ParameterSpec {
        name: Some(name.to_string()),
        kind: kind.to_string(),
        length: None,
        min: None,
        max: None,
        choices: None,
    }
}

pub fn hex_param(name: &str, length: u64) -> ParameterSpec {
    ParameterSpec {
        length: Some(length),
        ..param(name, "random_hex")
    }
}

pub fn int_param(name: &str, min: i64, max: i64) -> ParameterSpec {
    ParameterSpec {
        min: Some(min),
        max: Some(max),
        ..param(name, "random_int")
    }
}

pub fn choice_param(name: &str, choices: &[&str]) -> ParameterSpec {
    ParameterSpec {
        choices: Some(choices.iter().map(|choice| choice.to_string()).collect()),
        ..param(name, "choice")
    }
}

/// Temp directory holding a lab catalog, a staging root and a session store.
///
/// Every call to [`TestWorld::runner`] builds a fresh runner over the same
/// directories, which is how tests simulate a process restart.
pub struct TestWorld {
    temp: TempDir,
}

impl TestWorld {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        fs::create_dir_all(temp.path().join("labs")).context("create labs dir")?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn labs_dir(&self) -> PathBuf {
        self.path().join("labs")
    }

    pub fn staging_root(&self) -> PathBuf {
        self.path().join("staging")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.path().join("state/sessions")
    }

    /// Write `<labs>/<dir>/<file>`.
    pub fn write_lab(&self, dir: &str, file: &str, contents: &str) -> Result<PathBuf> {
        let lab_dir = self.labs_dir().join(dir);
        fs::create_dir_all(&lab_dir).with_context(|| format!("create {}", lab_dir.display()))?;
        let path = lab_dir.join(file);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// File-backed runner with a mock terminal.
    pub fn runner(&self) -> LabResult<LabRunner<DirCatalog, FileSessionStore, MockTerminal>> {
        let store = FileSessionStore::open(self.sessions_dir())?;
        LabRunner::new(
            DirCatalog::new(self.labs_dir()),
            store,
            MockTerminal,
            self.staging_root(),
        )
    }

    /// Runner with an empty in-memory store.
    pub fn memory_runner(
        &self,
    ) -> LabResult<LabRunner<DirCatalog, MemorySessionStore, MockTerminal>> {
        LabRunner::new(
            DirCatalog::new(self.labs_dir()),
            MemorySessionStore::new(),
            MockTerminal,
            self.staging_root(),
        )
    }
}

/// Shared view of how often a [`ScriptedValidator`] ran.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Validator with a fixed answer that counts its invocations.
#[derive(Debug, Clone)]
pub struct ScriptedValidator {
    kind: String,
    result: bool,
    calls: CallCounter,
}

impl ScriptedValidator {
    pub fn passing(kind: &str) -> Self {
        Self::new(kind, true)
    }

    pub fn failing(kind: &str) -> Self {
        Self::new(kind, false)
    }

    fn new(kind: &str, result: bool) -> Self {
        Self {
            kind: kind.to_string(),
            result,
            calls: CallCounter::default(),
        }
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl Validator for ScriptedValidator {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn evaluate(
        &self,
        _submission: &str,
        _spec: &ValidatorSpec,
        _ctx: &SessionContext<'_>,
    ) -> LabResult<bool> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        Ok(self.result)
    }
}
