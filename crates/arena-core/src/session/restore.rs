//! Restoring the real save from a practice backup.
//!
//! Used by both a normal end of practice and startup crash recovery.

use std::fs;
use std::io;

use arena_common::PracticeSessionId;
use serde::Serialize;
use tracing::{info, warn};

use super::files::{remove_if_exists, write_atomic, BackupManifest, SessionFiles};
use super::SessionError;
use crate::codec;

/// What a restore did to the real save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RestoreReport {
    /// No marker: there was no session to end.
    NothingToRestore,
    /// The save already matched the backup; nothing was copied.
    SaveUnchanged { session_id: PracticeSessionId },
    /// The backup was copied over the save.
    SaveRestored {
        session_id: PracticeSessionId,
        bytes: u64,
    },
    /// No save existed before practice; the one practice wrote was removed.
    SaveRemoved { session_id: PracticeSessionId },
}

fn failed(reason: impl Into<String>) -> SessionError {
    SessionError::RecoveryFailed {
        reason: reason.into(),
    }
}

/// Put the real save back as the manifest describes, then delete the
/// session files (marker last).
///
/// On any failure the marker is left in place so the next attempt, or the
/// next startup, tries again.
pub(crate) fn restore_and_clear(files: &SessionFiles) -> Result<RestoreReport, SessionError> {
    let Some(manifest) = files.read_marker()? else {
        discard_strays(files)?;
        return Ok(RestoreReport::NothingToRestore);
    };
    let report = restore_save(files, &manifest)?;

    files
        .remove_snapshot()
        .map_err(|e| failed(format!("cannot remove snapshot: {e}")))?;
    files
        .remove_backup()
        .map_err(|e| failed(format!("cannot remove backup: {e}")))?;
    files
        .remove_marker()
        .map_err(|e| failed(format!("cannot remove marker: {e}")))?;

    info!(session_id = %manifest.session_id, report = ?report, "practice session cleared");
    Ok(report)
}

/// Without a marker the real save was never handed to practice, so a
/// snapshot or backup left by an interrupted begin is simply deleted.
fn discard_strays(files: &SessionFiles) -> Result<(), SessionError> {
    let snapshot = files
        .remove_snapshot()
        .map_err(|e| SessionError::io(&files.snapshot_path(), e))?;
    let backup = files
        .remove_backup()
        .map_err(|e| SessionError::io(&files.backup_path(), e))?;
    if snapshot || backup {
        warn!(
            dir = %files.dir().display(),
            snapshot,
            backup,
            "discarded session files left without a marker"
        );
    }
    Ok(())
}

fn restore_save(
    files: &SessionFiles,
    manifest: &BackupManifest,
) -> Result<RestoreReport, SessionError> {
    let save_path = &manifest.save_path;
    let session_id = manifest.session_id.clone();
    let current = match fs::read(save_path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(failed(format!(
                "cannot read save {}: {e}",
                save_path.display()
            )))
        }
    };

    if !manifest.save_existed {
        return match current {
            None => Ok(RestoreReport::SaveUnchanged { session_id }),
            Some(_) => {
                remove_if_exists(save_path).map_err(|e| {
                    failed(format!("cannot remove save {}: {e}", save_path.display()))
                })?;
                Ok(RestoreReport::SaveRemoved { session_id })
            }
        };
    }

    if let Some(bytes) = &current {
        if bytes.len() as u64 == manifest.len && codec::sha256_hex(bytes) == manifest.sha256 {
            return Ok(RestoreReport::SaveUnchanged { session_id });
        }
    }

    let backup = files.read_backup().map_err(|e| {
        failed(format!(
            "backup {} unreadable: {e}",
            files.backup_path().display()
        ))
    })?;
    if backup.len() as u64 != manifest.len {
        return Err(failed(format!(
            "backup truncated: {} of {} bytes",
            backup.len(),
            manifest.len
        )));
    }
    if codec::sha256_hex(&backup) != manifest.sha256 {
        return Err(failed("backup checksum mismatch"));
    }

    write_atomic(save_path, &backup).map_err(|e| {
        failed(format!("cannot restore save {}: {e}", save_path.display()))
    })?;
    if current.is_none() {
        warn!(save = %save_path.display(), "save was missing during practice; restored from backup");
    }
    Ok(RestoreReport::SaveRestored {
        session_id,
        bytes: manifest.len,
    })
}
