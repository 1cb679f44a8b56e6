//! Exit codes for the `arena` CLI.
//!
//! Harnesses driving the CLI read these instead of parsing output. They are
//! stable.

use arena_common::Error;

/// Exit codes for arena operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success / nothing to do
    Clean = 0,

    /// `arena recover` restored the real save
    Recovered = 1,

    /// A practice session is already active
    SessionActive = 2,

    /// No practice session is active
    NoSession = 3,

    /// Requested loadout or run does not exist
    NotFound = 4,

    /// Configuration error
    ConfigError = 10,

    /// Store could not be opened or queried
    StoreError = 11,

    /// Snapshot or stored row could not be decoded
    DecodeError = 12,

    /// I/O error
    IoError = 13,

    /// Input violated a loadout or run invariant
    ConstraintError = 14,

    /// Restoring the real save failed; practice marker kept
    RecoveryFailed = 20,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::Recovered)
    }

    /// Exit code for an error surfaced to the CLI.
    pub fn for_error(error: &Error) -> Self {
        match error {
            Error::Config(_) => ExitCode::ConfigError,
            Error::StoreUnavailable { .. } | Error::SchemaMismatch { .. } | Error::Storage(_) => {
                ExitCode::StoreError
            }
            Error::ConstraintViolation(_) => ExitCode::ConstraintError,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Decode(_) | Error::UnsupportedFormat { .. } | Error::Json(_) => {
                ExitCode::DecodeError
            }
            Error::SessionActive(_) => ExitCode::SessionActive,
            Error::NoActiveSession => ExitCode::NoSession,
            Error::RecoveryFailed(_) => ExitCode::RecoveryFailed,
            Error::Io(_) => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}
