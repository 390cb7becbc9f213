//! Session persistence.
//!
//! The engine never decides where sessions live; a [`SessionStore`] is
//! constructed by the caller and handed to the runner.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::paths::validate_session_id;
use crate::core::types::SessionStatus;

/// Persisted session row.
///
/// `parameters` is the JSON encoding of the session's resolved parameters and
/// is treated as an opaque snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub lab_id: String,
    pub seed: String,
    pub parameters: String,
    pub status: SessionStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

pub trait SessionStore {
    /// Insert a new row. Fails if the id is already taken.
    fn create_session(&self, record: &SessionRecord) -> Result<()>;

    fn update_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;
}

/// One pretty-printed JSON file per session: `<dir>/<session_id>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open (and create if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn record_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

impl SessionStore for FileSessionStore {
    fn create_session(&self, record: &SessionRecord) -> Result<()> {
        let path = self.record_path(&record.id)?;
        let contents = encode(record)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                bail!("session {} already exists", record.id)
            }
            Err(err) => return Err(err).with_context(|| format!("create {}", path.display())),
        };
        file.write_all(contents.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        debug!(session_id = %record.id, "session row created");
        Ok(())
    }

    fn update_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut record = self
            .get_session(session_id)?
            .ok_or_else(|| anyhow!("session {session_id} not found"))?;
        record.status = status;
        let path = self.record_path(session_id)?;
        write_atomic(&path, &encode(&record)?)?;
        debug!(session_id, status = %status, "session status updated");
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let path = self.record_path(session_id)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("parse session {}", path.display()))?;
        Ok(Some(record))
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    rows: Mutex<BTreeMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, record: &SessionRecord) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| anyhow!("session store poisoned"))?;
        if rows.contains_key(&record.id) {
            bail!("session {} already exists", record.id);
        }
        rows.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn update_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| anyhow!("session store poisoned"))?;
        let record = rows
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("session {session_id} not found"))?;
        record.status = status;
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let rows = self.rows.lock().map_err(|_| anyhow!("session store poisoned"))?;
        Ok(rows.get(session_id).cloned())
    }
}

fn encode(record: &SessionRecord) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(record).context("serialize session")?;
    buf.push('\n');
    Ok(buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            user_id: "tester".to_string(),
            lab_id: "web-sqli-1".to_string(),
            seed: "feedface".to_string(),
            parameters: r#"{"SEED":"feedface"}"#.to_string(),
            status: SessionStatus::Running,
            created_at: "2026-01-18T12:00:00+00:00".to_string(),
        }
    }

    fn exercise(store: &dyn SessionStore) {
        assert!(store.get_session("abc").expect("get").is_none());
        store.create_session(&record("abc")).expect("create");
        store.create_session(&record("abc")).expect_err("duplicate");

        store
            .update_session_status("abc", SessionStatus::Passed)
            .expect("update");
        let loaded = store.get_session("abc").expect("get").expect("row");
        assert_eq!(loaded.status, SessionStatus::Passed);
        assert_eq!(loaded.parameters, r#"{"SEED":"feedface"}"#);

        store
            .update_session_status("missing", SessionStatus::Failed)
            .expect_err("missing row");
    }

    #[test]
    fn file_store_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::open(temp.path().join("sessions")).expect("open");
        exercise(&store);
        let on_disk = fs::read_to_string(temp.path().join("sessions/abc.json")).expect("read");
        assert!(on_disk.contains("\"status\": \"passed\""));
        assert!(on_disk.ends_with("}\n"));
    }

    #[test]
    fn file_store_rejects_path_like_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::open(temp.path()).expect("open");
        store.get_session("../etc").expect_err("bad id");
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySessionStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }
}
