//! Ethics-acknowledgement ledger.
//!
//! Users must acknowledge the ethics module before starting labs. The ledger
//! is a JSON map `user_id -> acknowledgement` in `<state_dir>/users.json`,
//! rewritten atomically on each new acknowledgement.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const LEDGER_FILE: &str = "users.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// RFC 3339 timestamp of the first acknowledgement.
    pub acknowledged_at: String,
}

#[derive(Debug)]
pub struct EthicsLedger {
    path: PathBuf,
    users: Mutex<BTreeMap<String, Acknowledgement>>,
}

impl EthicsLedger {
    /// Open the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let users = if path.exists() {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    /// Record an acknowledgement. Repeat calls keep the first timestamp.
    pub fn acknowledge(&self, user_id: &str) -> Result<Acknowledgement> {
        let mut users = self.users.lock().map_err(|_| anyhow!("ethics ledger poisoned"))?;
        if let Some(existing) = users.get(user_id) {
            return Ok(existing.clone());
        }
        let ack = Acknowledgement {
            acknowledged_at: chrono::Utc::now().to_rfc3339(),
        };
        users.insert(user_id.to_string(), ack.clone());
        if let Err(err) = write_atomic(&self.path, &users) {
            users.remove(user_id);
            return Err(err);
        }
        info!(user_id, "ethics acknowledged");
        Ok(ack)
    }

    pub fn is_acknowledged(&self, user_id: &str) -> Result<bool> {
        let users = self.users.lock().map_err(|_| anyhow!("ethics ledger poisoned"))?;
        Ok(users.contains_key(user_id))
    }
}

fn write_atomic(path: &Path, users: &BTreeMap<String, Acknowledgement>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(users).context("serialize ethics ledger")?;
    payload.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
