//! Semantic validation of a parsed configuration.

use thiserror::Error;

use crate::config::ArenaConfig;

/// Result of validating a configuration.
pub type ValidationResult = Result<(), ValidationError>;

/// A semantic problem in an otherwise well-formed config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported config schema version: {0}")]
    UnsupportedSchema(String),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("history_page_size must be at least 1")]
    ZeroPageSize,

    #[error("session_dir must differ from db_file ({0})")]
    SessionDirCollidesWithDb(String),
}

/// Validate a configuration.
pub fn validate(config: &ArenaConfig) -> ValidationResult {
    let major = config.schema_version.split('.').next().unwrap_or_default();
    let supported = crate::CONFIG_SCHEMA_VERSION
        .split('.')
        .next()
        .unwrap_or_default();
    if major != supported {
        return Err(ValidationError::UnsupportedSchema(
            config.schema_version.clone(),
        ));
    }

    if config.db_file.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "db_file" });
    }
    if config.session_dir.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: "session_dir",
        });
    }
    if config.history_page_size == 0 {
        return Err(ValidationError::ZeroPageSize);
    }
    if config.session_dir == config.db_file {
        return Err(ValidationError::SessionDirCollidesWithDb(
            config.db_file.clone(),
        ));
    }

    Ok(())
}
