//! Practice Arena configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `config.json`
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation

pub mod config;
pub mod resolve;
pub mod validate;

pub use config::{
    ArenaConfig, LogConfig, DEFAULT_DB_FILE, DEFAULT_HISTORY_PAGE_SIZE, DEFAULT_SESSION_DIR,
};
pub use resolve::{resolve_config, resolve_config_with, ConfigOverrides, ResolvedConfig};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Directory name used under the platform config/data roots.
pub const APP_DIR_NAME: &str = "practice_arena";
