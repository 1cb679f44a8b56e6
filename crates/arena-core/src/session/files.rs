//! On-disk session files.
//!
//! A practice session lives in one directory:
//!
//! - `snapshot.json`: the live run state and practised loadout
//! - `save.backup`: byte copy of the real save (empty if none existed)
//! - `practice.marker`: [`BackupManifest`] describing the backup
//!
//! Every file is written to a temporary sibling, synced, then renamed into
//! place, so readers see either the old file or the complete new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use arena_common::{LoadoutId, PracticeSessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SessionError;
use crate::codec::{self, SessionSnapshot};
use crate::model::Loadout;

pub const MARKER_FILE: &str = "practice.marker";
pub const BACKUP_FILE: &str = "save.backup";
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Contents of the practice marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub session_id: PracticeSessionId,
    pub loadout_id: LoadoutId,
    /// Real save file the backup was taken from.
    pub save_path: PathBuf,
    /// False when there was no save to back up; restore then deletes
    /// whatever practice left at `save_path`.
    pub save_existed: bool,
    /// SHA-256 of the backed-up bytes.
    pub sha256: String,
    pub len: u64,
    pub created_at: DateTime<Utc>,
    /// The practised loadout as it stood at begin. Lets a later process
    /// keep recording after the stored loadout was deleted.
    #[serde(default)]
    pub loadout: Option<Loadout>,
}

/// Which session files are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FileStatus {
    pub snapshot: bool,
    pub backup: bool,
    pub marker: bool,
}

impl FileStatus {
    /// A practice session exists exactly when its snapshot does.
    pub fn session_exists(&self) -> bool {
        self.snapshot
    }

    pub fn is_clean(&self) -> bool {
        !self.snapshot && !self.backup && !self.marker
    }
}

/// Result of copying the real save aside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub save_existed: bool,
    pub sha256: String,
    pub len: u64,
}

/// Paths and primitive operations for the session directory.
#[derive(Debug, Clone)]
pub struct SessionFiles {
    dir: PathBuf,
}

impl SessionFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(MARKER_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn status(&self) -> FileStatus {
        FileStatus {
            snapshot: self.snapshot_path().exists(),
            backup: self.backup_path().exists(),
            marker: self.marker_path().exists(),
        }
    }

    fn ensure_dir(&self) -> Result<(), SessionError> {
        fs::create_dir_all(&self.dir).map_err(|e| SessionError::io(&self.dir, e))
    }

    pub fn write_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        self.ensure_dir()?;
        let encoded = codec::encode_snapshot(snapshot)?;
        let path = self.snapshot_path();
        write_atomic(&path, encoded.as_bytes()).map_err(|e| SessionError::io(&path, e))
    }

    pub fn read_snapshot(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        let path = self.snapshot_path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(codec::decode_snapshot(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::io(&path, e)),
        }
    }

    /// Copy the real save (if any) into the backup file.
    pub fn write_backup(&self, save_path: &Path) -> Result<BackupInfo, SessionError> {
        self.ensure_dir()?;
        let (bytes, save_existed) = match fs::read(save_path) {
            Ok(bytes) => (bytes, true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (Vec::new(), false),
            Err(e) => return Err(SessionError::io(save_path, e)),
        };
        let path = self.backup_path();
        write_atomic(&path, &bytes).map_err(|e| SessionError::io(&path, e))?;
        Ok(BackupInfo {
            save_existed,
            sha256: codec::sha256_hex(&bytes),
            len: bytes.len() as u64,
        })
    }

    pub fn read_backup(&self) -> io::Result<Vec<u8>> {
        fs::read(self.backup_path())
    }

    pub fn write_marker(&self, manifest: &BackupManifest) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.marker_path(), &json)
    }

    /// Read the marker. A marker that exists but cannot be parsed is an
    /// error; the caller must not treat it as absent.
    pub fn read_marker(&self) -> Result<Option<BackupManifest>, SessionError> {
        let path = self.marker_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                SessionError::RecoveryFailed {
                    reason: format!("unreadable marker {}: {e}", path.display()),
                }
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::io(&path, e)),
        }
    }

    pub fn remove_snapshot(&self) -> io::Result<bool> {
        remove_if_exists(&self.snapshot_path())
    }

    pub fn remove_backup(&self) -> io::Result<bool> {
        remove_if_exists(&self.backup_path())
    }

    pub fn remove_marker(&self) -> io::Result<bool> {
        remove_if_exists(&self.marker_path())
    }
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    sync_parent(path);
    debug!(path = %path.display(), bytes = bytes.len(), "file written");
    Ok(())
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// Remove a file, returning whether it existed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
