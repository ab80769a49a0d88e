//! Console configuration, loaded from TOML.
//!
//! Everything has a default so the console runs with no config file at all.
//! CLI flags override file values at the binary seam.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to do with the on-screen tally when a session stops.
///
/// The persistent cache is always cleared on stop; this only governs the
/// in-memory display. `Retain` keeps the final result visible (spectator
/// default), `Clear` blanks the panel for kiosk-style installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnStop {
    #[default]
    Retain,
    Clear,
}

/// Top-level console config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Timer server address: `host:port` or a full `http(s)://` URL.
    pub server: String,
    /// Session history page size.
    pub page_size: usize,
    /// Delay before re-polling `/status` after a device transition, so the
    /// server has settled the connection before we log its roster. A
    /// best-effort mitigation, not an acknowledgement.
    pub settle_delay_ms: u64,
    /// Delay between a session stopping and the history refresh, so the
    /// server finishes writing its export before we query it. Same caveat.
    pub refresh_delay_ms: u64,
    /// Display policy on session stop.
    pub on_stop: OnStop,
    /// Override for the persistent state file path.
    pub state_file: Option<PathBuf>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8000".into(),
            page_size: 20,
            settle_delay_ms: 500,
            refresh_delay_ms: 1000,
            on_stop: OnStop::Retain,
            state_file: None,
        }
    }
}

impl ConsoleConfig {
    /// Load config from a TOML file path. Returns None if the file doesn't
    /// exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }

    /// Load from the default location, falling back to defaults when the
    /// file (or the config dir itself) is absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Ok(Self::load(&path)?.unwrap_or_default()),
            None => Ok(Self::default()),
        }
    }

    /// Platform config file location (`~/.config/sgtc/config.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sgtc").join("config.toml"))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }
}

/// Errors that can occur when loading config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    ReadFailed(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    ParseFailed(PathBuf, #[source] toml::de::Error),
}
