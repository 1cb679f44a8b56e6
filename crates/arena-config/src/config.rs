//! Configuration file model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::CONFIG_SCHEMA_VERSION;

/// Default SQLite file name inside the data directory.
pub const DEFAULT_DB_FILE: &str = "arena.db";

/// Default session directory name inside the data directory.
pub const DEFAULT_SESSION_DIR: &str = "session";

/// Default number of rows fetched per history page.
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 200;

/// Contents of `config.json`. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Config file format version.
    pub schema_version: String,

    /// Data directory override. Relative paths resolve against the config
    /// file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// SQLite file name (or absolute path) for loadouts and run history.
    pub db_file: String,

    /// Directory holding the practice marker, save backup, and snapshot.
    pub session_dir: String,

    /// Rows fetched per page when iterating history.
    pub history_page_size: usize,

    /// Logging settings.
    pub log: LogConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            data_dir: None,
            db_file: DEFAULT_DB_FILE.to_string(),
            session_dir: DEFAULT_SESSION_DIR.to_string(),
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            log: LogConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Parse a config document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, e.g. `info` or `arena_core=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
