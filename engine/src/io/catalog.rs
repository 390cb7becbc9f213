//! Lab catalog backed by a directory of lab directories.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::lab::{DEFINITION_FILES, LabDefinition};

/// Read-only source of lab definitions.
pub trait LabCatalog {
    /// All labs, sorted by id.
    fn list(&self) -> Result<Vec<LabDefinition>>;

    fn get(&self, lab_id: &str) -> Result<Option<LabDefinition>> {
        Ok(self.list()?.into_iter().find(|lab| lab.id == lab_id))
    }
}

/// `<root>/<lab-dir>/lab.{yaml,yml,toml}`.
///
/// Definitions are re-read on every call so edits show up without a restart.
#[derive(Debug, Clone)]
pub struct DirCatalog {
    root: PathBuf,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LabCatalog for DirCatalog {
    fn list(&self) -> Result<Vec<LabDefinition>> {
        discover_labs(&self.root)
    }
}

/// Discover and load every lab under `dir`.
///
/// Returns labs sorted by id. Errors if duplicate ids are found.
pub fn discover_labs(dir: &Path) -> Result<Vec<LabDefinition>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut labs: Vec<(LabDefinition, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read labs dir {}", dir.display()))? {
        let entry = entry.context("read lab entry")?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(definition) = definition_file(&path) else {
            debug!(dir = %path.display(), "no lab definition, skipping");
            continue;
        };
        let lab = LabDefinition::load(&definition)?;
        labs.push((lab, definition));
    }
    labs.sort_by(|left, right| left.0.id.cmp(&right.0.id));
    for pair in labs.windows(2) {
        if pair[0].0.id == pair[1].0.id {
            return Err(anyhow!(
                "duplicate lab id {} ({} and {})",
                pair[0].0.id,
                pair[0].1.display(),
                pair[1].1.display()
            ));
        }
    }
    Ok(labs.into_iter().map(|(lab, _)| lab).collect())
}

fn definition_file(lab_dir: &Path) -> Option<PathBuf> {
    DEFINITION_FILES
        .iter()
        .map(|name| lab_dir.join(name))
        .find(|candidate| candidate.is_file())
}
