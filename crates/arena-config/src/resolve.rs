//! Configuration resolution.
//!
//! Precedence, highest first:
//!
//! 1. Explicit CLI flags (`--config`, `--data-dir`, `--db`)
//! 2. Environment (`ARENA_CONFIG`, `ARENA_DATA_DIR`, `ARENA_DB`)
//! 3. Values from `config.json`
//! 4. XDG base directories (`XDG_CONFIG_HOME`, `XDG_DATA_HOME`)
//! 5. Platform defaults from `dirs`
//!
//! A missing config file is not an error; every field has a default.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ArenaConfig;
use crate::validate::{validate, ValidationError};
use crate::APP_DIR_NAME;

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG: &str = "ARENA_CONFIG";

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "ARENA_DATA_DIR";

/// Environment variable overriding the database path.
pub const ENV_DB: &str = "ARENA_DB";

const CONFIG_FILE_NAME: &str = "config.json";

/// Errors from configuration resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),

    #[error("failed to resolve data directory")]
    DataDirUnavailable,
}

impl From<ConfigError> for arena_common::Error {
    fn from(e: ConfigError) -> Self {
        arena_common::Error::Config(e.to_string())
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

/// Fully resolved configuration with concrete paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Parsed (or default) config contents.
    pub config: ArenaConfig,
    /// File the config was loaded from, if any existed.
    pub source: Option<PathBuf>,
    /// Root data directory.
    pub data_dir: PathBuf,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Practice session file directory.
    pub session_dir: PathBuf,
}

/// Resolve configuration from the process environment.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig, ConfigError> {
    resolve_config_with(overrides, |key| std::env::var(key).ok())
}

/// Resolve configuration with an injectable environment lookup.
pub fn resolve_config_with<F>(
    overrides: &ConfigOverrides,
    env: F,
) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_path = overrides
        .config_path
        .clone()
        .or_else(|| env(ENV_CONFIG).map(PathBuf::from))
        .or_else(|| default_config_path(&env));

    let (config, source) = match config_path {
        Some(path) if path.exists() => (load_config_file(&path)?, Some(path)),
        _ => (ArenaConfig::default(), None),
    };
    validate(&config)?;

    let data_dir = match overrides
        .data_dir
        .clone()
        .or_else(|| env(ENV_DATA_DIR).map(PathBuf::from))
    {
        Some(dir) => dir,
        None => match &config.data_dir {
            Some(dir) => relative_to_source(dir, source.as_deref()),
            None => default_data_dir(&env).ok_or(ConfigError::DataDirUnavailable)?,
        },
    };

    let db_path = overrides
        .db_path
        .clone()
        .or_else(|| env(ENV_DB).map(PathBuf::from))
        .unwrap_or_else(|| data_dir.join(&config.db_file));
    let session_dir = data_dir.join(&config.session_dir);

    Ok(ResolvedConfig {
        config,
        source,
        data_dir,
        db_path,
        session_dir,
    })
}

/// Load and parse a config file.
pub fn load_config_file(path: &Path) -> Result<ArenaConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    ArenaConfig::from_json(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn relative_to_source(dir: &Path, source: Option<&Path>) -> PathBuf {
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    match source.and_then(Path::parent) {
        Some(parent) => parent.join(dir),
        None => dir.to_path_buf(),
    }
}

fn default_config_path<F>(env: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(xdg) = env("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    dirs::config_dir().map(|base| base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_data_dir<F>(env: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(xdg) = env("XDG_DATA_HOME") {
        return Some(PathBuf::from(xdg).join(APP_DIR_NAME));
    }
    dirs::data_dir().map(|base| base.join(APP_DIR_NAME))
}
