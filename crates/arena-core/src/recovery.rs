//! Startup crash recovery.
//!
//! If a previous process died while practice was active, the practice
//! marker is still on disk and the real save may hold practice state. The
//! supervisor puts the real save back before anything else runs.

use serde::Serialize;
use tracing::{error, info};

use crate::session::{restore_and_clear, RestoreReport, SessionFiles, SessionState};

/// Result of a startup recovery check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// No interrupted session was found.
    None,
    /// An interrupted session was found and the real save restored.
    Restored { report: RestoreReport },
    /// Restore failed. The marker is kept so the next start retries.
    RestoreFailed { reason: String },
}

impl RecoveryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RecoveryOutcome::RestoreFailed { .. })
    }
}

/// Runs the restore routine against leftover session files.
#[derive(Debug, Clone)]
pub struct RecoverySupervisor {
    files: SessionFiles,
}

impl RecoverySupervisor {
    pub fn new(files: SessionFiles) -> Self {
        Self { files }
    }

    /// Restore the real save if a session was interrupted.
    ///
    /// Session files present without a marker came from a begin that never
    /// finished; they are discarded and the outcome is `None`.
    pub fn check_and_recover(&self) -> RecoveryOutcome {
        let status = self.files.status();
        if status.is_clean() {
            return RecoveryOutcome::None;
        }
        if status.marker {
            info!(
                dir = %self.files.dir().display(),
                state = %SessionState::Restoring,
                "interrupted practice session found"
            );
        }

        match restore_and_clear(&self.files) {
            Ok(RestoreReport::NothingToRestore) => RecoveryOutcome::None,
            Ok(report) => {
                info!(report = ?report, "real save recovered");
                RecoveryOutcome::Restored { report }
            }
            Err(e) => {
                let reason = e.to_string();
                error!(
                    dir = %self.files.dir().display(),
                    reason = %reason,
                    "crash recovery failed; practice marker kept"
                );
                RecoveryOutcome::RestoreFailed { reason }
            }
        }
    }
}
