//! Engine configuration stored in `engine.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::template::RenderMode;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "engine.toml";

/// Engine configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values suitable for a local checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Catalog root: one subdirectory per lab.
    pub labs_dir: PathBuf,

    /// Staging root: one subdirectory per session.
    pub staging_dir: PathBuf,

    /// Session rows and the ethics ledger live here.
    pub state_dir: PathBuf,

    /// Fail on unknown template placeholders instead of rendering them empty.
    pub strict_templates: bool,

    pub terminal: TerminalConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TerminalMode {
    /// Spawn a `ttyd` process per session.
    Ttyd,
    /// Return a fake connection without spawning anything.
    Mock,
    /// Never provision a terminal.
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TerminalConfig {
    pub mode: TerminalMode,
    /// `ttyd` executable name or path.
    pub binary: String,
    /// Host used in returned connection URLs.
    pub host: String,
    pub port_min: u16,
    pub port_max: u16,
    /// Shell launched inside the terminal.
    pub shell: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            mode: TerminalMode::Ttyd,
            binary: "ttyd".to_string(),
            host: "localhost".to_string(),
            port_min: 10_000,
            port_max: 49_999,
            shell: "bash".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            labs_dir: PathBuf::from("labs"),
            staging_dir: PathBuf::from(".lab-sessions"),
            state_dir: PathBuf::from(".lab-state"),
            strict_templates: false,
            terminal: TerminalConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.labs_dir.as_os_str().is_empty() {
            return Err(anyhow!("labs_dir must be non-empty"));
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(anyhow!("staging_dir must be non-empty"));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(anyhow!("state_dir must be non-empty"));
        }
        self.terminal.validate()
    }

    pub fn render_mode(&self) -> RenderMode {
        if self.strict_templates {
            RenderMode::Strict
        } else {
            RenderMode::Permissive
        }
    }

    /// Directory holding one JSON row per session.
    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }
}

impl TerminalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port_min == 0 {
            return Err(anyhow!("terminal.port_min must be > 0"));
        }
        if self.port_min > self.port_max {
            return Err(anyhow!("terminal.port_min must be <= terminal.port_max"));
        }
        if self.binary.trim().is_empty() {
            return Err(anyhow!("terminal.binary must be non-empty"));
        }
        if self.shell.trim().is_empty() {
            return Err(anyhow!("terminal.shell must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
