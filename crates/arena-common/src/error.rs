//! Error types for the practice arena.

use thiserror::Error;

/// Result type alias for arena operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the practice arena.
///
/// Module-level errors (store, codec, session) are folded into these kinds at
/// the binary boundary so callers and exit codes see one taxonomy.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Store errors (20-29)
    #[error("store unavailable at {path}: {reason}")]
    StoreUnavailable { path: String, reason: String },

    #[error("store schema version {found} is newer than supported version {supported}")]
    SchemaMismatch { found: u32, supported: u32 },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    // Codec errors (30-39)
    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported format version {found} (newest supported: {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },

    // Session errors (40-49)
    #[error("a practice session is already active: {0}")]
    SessionActive(String),

    #[error("no practice session is active")]
    NoActiveSession,

    #[error("recovery failed: {0}")]
    RecoveryFailed(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::StoreUnavailable { .. } => 20,
            Error::SchemaMismatch { .. } => 21,
            Error::ConstraintViolation(_) => 22,
            Error::NotFound(_) => 23,
            Error::Storage(_) => 24,
            Error::Decode(_) => 30,
            Error::UnsupportedFormat { .. } => 31,
            Error::SessionActive(_) => 40,
            Error::NoActiveSession => 41,
            Error::RecoveryFailed(_) => 42,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Whether the process should refuse to continue after this error.
    ///
    /// Decode failures are scoped to one record and leave the rest of the
    /// store usable; an unreadable store or a newer schema is not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable { .. } | Error::SchemaMismatch { .. } | Error::RecoveryFailed(_)
        )
    }
}
