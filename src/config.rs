//! Configuration file handling.
//!
//! Looked up at `<config dir>/sift/config.toml` unless a path is given.
//! Every key is optional.
//!
//! ```toml
//! debounce_ms = 250
//! event_capacity = 256
//!
//! [store]
//! url = "sqlite://records.db"
//! table = "records"
//! key_column = "id"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SiftError, SiftResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    /// Quiet period after the last keystroke before a search runs.
    pub debounce_ms: u64,
    /// Buffered notifications per observer before slow observers lag.
    pub event_capacity: usize,
    pub store: StoreConfig,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            event_capacity: 256,
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: Option<String>,
    pub table: String,
    pub key_column: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            table: "records".to_string(),
            key_column: "id".to_string(),
        }
    }
}

impl SiftConfig {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sift").join("config.toml"))
    }

    /// Load from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> SiftResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> SiftResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| SiftError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> SiftResult<Self> {
        toml::from_str(text).map_err(|e| SiftError::Config(e.to_string()))
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            event_capacity: self.event_capacity,
        }
    }
}

/// Runtime settings of a [`FilterSession`](crate::session::FilterSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub debounce: Duration,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SiftConfig::default().session()
    }
}
