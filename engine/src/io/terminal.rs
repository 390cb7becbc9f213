//! Interactive terminal provisioning (ttyd).
//!
//! Provisioning is best-effort from the runner's point of view: a spawned
//! `ttyd` is handed to a detached reaper thread, and the runner only forwards
//! the returned URL and token.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::io::config::{TerminalConfig, TerminalMode};

#[derive(Debug, Clone)]
pub struct TerminalRequest {
    pub session_id: String,
    /// The session's staging directory; the shell starts here.
    pub working_dir: PathBuf,
    pub seed: String,
}

/// Connection details handed back to the learner's client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConnection {
    pub url: String,
    pub token: String,
}

pub trait TerminalProvisioner {
    /// `Ok(None)` means terminals are turned off.
    fn provision(&self, request: &TerminalRequest) -> Result<Option<TerminalConnection>>;
}

/// Access token for a session's terminal: SHA-256 of `session_id || seed`.
pub fn access_token(session_id: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Spawns `ttyd -p <port> --once -t token=<token> <shell>` per session.
#[derive(Debug, Clone)]
pub struct TtydTerminal {
    pub binary: String,
    pub host: String,
    pub port_min: u16,
    pub port_max: u16,
    pub shell: String,
}

impl TerminalProvisioner for TtydTerminal {
    fn provision(&self, request: &TerminalRequest) -> Result<Option<TerminalConnection>> {
        let token = access_token(&request.session_id, &request.seed);
        let port = rand::thread_rng().gen_range(self.port_min..=self.port_max);
        let mut child = Command::new(&self.binary)
            .arg("-p")
            .arg(port.to_string())
            .arg("--once")
            .arg("-t")
            .arg(format!("token={token}"))
            .arg(&self.shell)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {}", self.binary))?;
        let pid = child.id();
        info!(session_id = %request.session_id, pid, port, "ttyd spawned");
        // ttyd exits on its own after the single client disconnects (`--once`).
        let session_id = request.session_id.clone();
        thread::Builder::new()
            .name(format!("ttyd-reaper-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => debug!(session_id = %session_id, pid, %status, "ttyd exited"),
                Err(err) => warn!(session_id = %session_id, pid, error = %err, "ttyd wait failed"),
            })
            .context("spawn ttyd reaper")?;
        Ok(Some(TerminalConnection {
            url: format!("ws://{}:{}/?token={}", self.host, port, token),
            token,
        }))
    }
}

/// Returns a fixed `wss://mock-ttyd/<session_id>` connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTerminal;

impl TerminalProvisioner for MockTerminal {
    fn provision(&self, request: &TerminalRequest) -> Result<Option<TerminalConnection>> {
        debug!(session_id = %request.session_id, "mock terminal provisioned");
        Ok(Some(TerminalConnection {
            url: format!("wss://mock-ttyd/{}", request.session_id),
            token: access_token(&request.session_id, &request.seed),
        }))
    }
}

/// Terminal backend selected by [`TerminalConfig::mode`].
#[derive(Debug, Clone)]
pub enum Terminal {
    Ttyd(TtydTerminal),
    Mock(MockTerminal),
    Disabled,
}

impl Terminal {
    pub fn from_config(cfg: &TerminalConfig) -> Self {
        match cfg.mode {
            TerminalMode::Ttyd => Self::Ttyd(TtydTerminal {
                binary: cfg.binary.clone(),
                host: cfg.host.clone(),
                port_min: cfg.port_min,
                port_max: cfg.port_max,
                shell: cfg.shell.clone(),
            }),
            TerminalMode::Mock => Self::Mock(MockTerminal),
            TerminalMode::Disabled => Self::Disabled,
        }
    }
}

impl TerminalProvisioner for Terminal {
    fn provision(&self, request: &TerminalRequest) -> Result<Option<TerminalConnection>> {
        match self {
            Self::Ttyd(ttyd) => ttyd.provision(request),
            Self::Mock(mock) => mock.provision(request),
            Self::Disabled => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TerminalRequest {
        TerminalRequest {
            session_id: "sess-1".to_string(),
            working_dir: PathBuf::from("."),
            seed: "feedface".to_string(),
        }
    }

    #[test]
    fn token_depends_on_session_and_seed() {
        let token = access_token("sess-1", "feedface");
        assert_eq!(token.len(), 64);
        assert_eq!(token, access_token("sess-1", "feedface"));
        assert_ne!(token, access_token("sess-2", "feedface"));
        assert_ne!(token, access_token("sess-1", "cafebabe"));
    }

    #[test]
    fn mock_returns_stable_url() {
        let conn = MockTerminal.provision(&request()).expect("provision").expect("conn");
        assert_eq!(conn.url, "wss://mock-ttyd/sess-1");
        assert_eq!(conn.token, access_token("sess-1", "feedface"));
    }

    #[test]
    fn config_selects_backend() {
        let mut cfg = TerminalConfig::default();
        assert!(matches!(Terminal::from_config(&cfg), Terminal::Ttyd(_)));
        cfg.mode = TerminalMode::Disabled;
        let terminal = Terminal::from_config(&cfg);
        assert!(terminal.provision(&request()).expect("provision").is_none());
    }

    /// Children of this process currently in the zombie state.
    #[cfg(target_os = "linux")]
    fn zombie_children() -> usize {
        let me = std::process::id().to_string();
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| std::fs::read_to_string(entry.path().join("status")).ok())
            .filter(|status| {
                let field = |key: &str| {
                    status
                        .lines()
                        .find_map(|line| line.strip_prefix(key))
                        .map(str::trim)
                        .unwrap_or("")
                        .to_string()
                };
                field("PPid:") == me && field("State:").starts_with('Z')
            })
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn exited_ttyd_processes_are_reaped() {
        // `true` ignores ttyd's arguments and exits immediately.
        let ttyd = TtydTerminal {
            binary: "true".to_string(),
            host: "localhost".to_string(),
            port_min: 10_000,
            port_max: 10_000,
            shell: "bash".to_string(),
        };
        for _ in 0..5 {
            let conn = ttyd.provision(&request()).expect("provision").expect("conn");
            assert!(conn.url.starts_with("ws://localhost:10000/?token="));
        }

        let mut zombies = zombie_children();
        for _ in 0..50 {
            if zombies == 0 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(100));
            zombies = zombie_children();
        }
        assert_eq!(zombies, 0, "zombie children left behind");
    }

    #[test]
    fn missing_ttyd_binary_is_an_error() {
        let ttyd = TtydTerminal {
            binary: "definitely-not-a-real-ttyd-binary".to_string(),
            host: "localhost".to_string(),
            port_min: 10_000,
            port_max: 10_000,
            shell: "bash".to_string(),
        };
        let err = ttyd.provision(&request()).expect_err("spawn fails");
        assert!(err.to_string().contains("spawn definitely-not-a-real-ttyd-binary"));
    }
}
