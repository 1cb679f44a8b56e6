//! Practice session capture and restore.
//!
//! # State Machine
//!
//! ```text
//! Idle ──begin_practice──▶ PracticeActive ──end_practice──▶ Restoring ──▶ Idle
//!                               │   ▲                           │
//!                               └───┘ record_fight              ▼
//!                                                        RecoveryFailed
//!                                                        (marker kept)
//! ```
//!
//! The real save is copied aside before practice may touch it, and copied
//! back (or removed, if there was none) when practice ends. The same restore
//! runs at startup if a previous process died mid-session.

mod files;
mod manager;
mod restore;

pub use files::{
    write_atomic, BackupInfo, BackupManifest, FileStatus, SessionFiles, BACKUP_FILE, MARKER_FILE,
    SNAPSHOT_FILE,
};
pub use manager::{PracticeRequest, PracticeSession, PracticeTarget, SessionManager};
pub use restore::RestoreReport;

pub(crate) use restore::restore_and_clear;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StoreError;

/// Runtime state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    PracticeActive,
    Restoring,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::PracticeActive => write!(f, "practice_active"),
            SessionState::Restoring => write!(f, "restoring"),
        }
    }
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a practice session is already active in {}", dir.display())]
    AlreadyActive { dir: PathBuf },

    #[error("no practice session is active")]
    NotActive,

    #[error("snapshot codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backup was written but the marker was not. The backup is left
    /// on disk and practice must not start.
    #[error("cannot write practice marker {}: {source}", path.display())]
    MarkerWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("restore failed: {reason}")]
    RecoveryFailed { reason: String },
}

impl SessionError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<SessionError> for arena_common::Error {
    fn from(e: SessionError) -> Self {
        use arena_common::Error;
        match e {
            SessionError::AlreadyActive { dir } => Error::SessionActive(dir.display().to_string()),
            SessionError::NotActive => Error::NoActiveSession,
            SessionError::Codec(e) => e.into(),
            SessionError::Store(e) => e.into(),
            SessionError::Io { source, .. } => Error::Io(source),
            e @ SessionError::MarkerWrite { .. } => Error::RecoveryFailed(e.to_string()),
            SessionError::RecoveryFailed { reason } => Error::RecoveryFailed(reason),
        }
    }
}
