//! Session manager: begin, record, and end practice.

use std::path::PathBuf;

use arena_common::{LoadoutId, PracticeSessionId, RunId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::files::{BackupManifest, SessionFiles};
use super::restore::{restore_and_clear, RestoreReport};
use super::{SessionError, SessionState};
use crate::codec::SessionSnapshot;
use crate::model::{FightResult, Loadout, NewLoadout, NewRunRecord, RunState};
use crate::store::{ArenaStore, StoreError};

/// Which loadout a practice session fights with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeTarget {
    /// Fight with a loadout that is already stored.
    ExistingLoadout(LoadoutId),
    /// Save the live run as a new loadout and fight with that.
    CaptureLive { name: String },
}

/// Everything needed to start practice.
///
/// `state` must be the run as it stood before combat began; the manager
/// never reconstructs it.
#[derive(Debug, Clone)]
pub struct PracticeRequest {
    pub state: RunState,
    pub save_path: PathBuf,
    pub target: PracticeTarget,
}

/// The active practice session.
#[derive(Debug, Clone, Serialize)]
pub struct PracticeSession {
    pub session_id: PracticeSessionId,
    pub loadout: Loadout,
    pub save_path: PathBuf,
    pub save_existed: bool,
    pub started_at: DateTime<Utc>,
}

/// Owns the session files and drives the practice lifecycle.
#[derive(Debug)]
pub struct SessionManager {
    store: ArenaStore,
    files: SessionFiles,
    state: SessionState,
    active: Option<PracticeSession>,
}

impl SessionManager {
    /// Create a manager, picking up a session a previous process left
    /// active.
    ///
    /// Session files that cannot be resumed are not an error here. The
    /// manager starts in [`SessionState::Restoring`] so it never reports
    /// idle over files still on disk; [`end_practice`](Self::end_practice)
    /// or startup recovery clears them.
    pub fn open(store: ArenaStore, files: SessionFiles) -> Self {
        let mut manager = Self {
            store,
            files,
            state: SessionState::Idle,
            active: None,
        };
        match manager.resume() {
            Ok(Some(session)) => {
                info!(session_id = %session.session_id, loadout_id = %session.loadout.id, "resumed practice session");
                manager.state = SessionState::PracticeActive;
                manager.active = Some(session);
            }
            Ok(None) if manager.files.status().is_clean() => {}
            Ok(None) => {
                warn!(dir = %manager.files.dir().display(), "incomplete practice session files; end practice to clear them");
                manager.state = SessionState::Restoring;
            }
            Err(e) => {
                error!(error = %e, dir = %manager.files.dir().display(), "cannot resume practice session; end practice to restore the save");
                manager.state = SessionState::Restoring;
            }
        }
        manager
    }

    fn resume(&self) -> Result<Option<PracticeSession>, SessionError> {
        let Some(manifest) = self.files.read_marker()? else {
            return Ok(None);
        };
        let Some(snapshot) = self.files.read_snapshot()? else {
            return Ok(None);
        };
        let loadout = match self.store.get_loadout(snapshot.loadout_id) {
            Ok(loadout) => loadout,
            Err(StoreError::NotFound(what)) => match manifest.loadout {
                Some(copy) => {
                    warn!(loadout_id = %snapshot.loadout_id, "practised loadout was deleted; runs will be recorded detached");
                    copy
                }
                None => return Err(StoreError::NotFound(what).into()),
            },
            Err(e) => return Err(e.into()),
        };
        Ok(Some(PracticeSession {
            session_id: manifest.session_id,
            loadout,
            save_path: manifest.save_path,
            save_existed: manifest.save_existed,
            started_at: manifest.created_at,
        }))
    }

    pub fn status(&self) -> SessionState {
        self.state
    }

    /// Whether a practice session exists on disk.
    pub fn is_practice_active(&self) -> bool {
        self.files.status().session_exists()
    }

    pub fn active_session(&self) -> Option<&PracticeSession> {
        self.active.as_ref()
    }

    pub fn active_loadout(&self) -> Option<&Loadout> {
        self.active.as_ref().map(|s| &s.loadout)
    }

    pub fn files(&self) -> &SessionFiles {
        &self.files
    }

    pub fn store(&self) -> &ArenaStore {
        &self.store
    }

    /// Start practice: snapshot the run, back up the save, then write the
    /// marker.
    ///
    /// If the snapshot or backup cannot be written, whatever this call
    /// wrote is removed and the manager stays idle. If the marker cannot be
    /// written the backup is kept and [`SessionError::MarkerWrite`] is
    /// returned; practice must not start.
    pub fn begin_practice(
        &mut self,
        request: PracticeRequest,
    ) -> Result<PracticeSession, SessionError> {
        let status = self.files.status();
        if status.session_exists() || status.marker {
            return Err(SessionError::AlreadyActive {
                dir: self.files.dir().to_path_buf(),
            });
        }
        request.state.validate().map_err(StoreError::from)?;

        let PracticeRequest {
            state,
            save_path,
            target,
        } = request;
        let (loadout, captured) = match target {
            PracticeTarget::ExistingLoadout(id) => (self.store.get_loadout(id)?, None),
            PracticeTarget::CaptureLive { name } => {
                let id = self
                    .store
                    .save_loadout(&NewLoadout::from_run_state(name, &state))?;
                (self.store.get_loadout(id)?, Some(id))
            }
        };

        let snapshot = SessionSnapshot {
            loadout_id: loadout.id,
            state,
        };
        if let Err(e) = self.files.write_snapshot(&snapshot) {
            self.abandon_begin(captured);
            return Err(e);
        }
        let backup = match self.files.write_backup(&save_path) {
            Ok(backup) => backup,
            Err(e) => {
                self.abandon_begin(captured);
                return Err(e);
            }
        };

        let session_id = PracticeSessionId::new();
        let started_at = Utc::now();
        let manifest = BackupManifest {
            session_id: session_id.clone(),
            loadout_id: loadout.id,
            save_path: save_path.clone(),
            save_existed: backup.save_existed,
            sha256: backup.sha256,
            len: backup.len,
            created_at: started_at,
            loadout: Some(loadout.clone()),
        };
        if let Err(source) = self.files.write_marker(&manifest) {
            let path = self.files.marker_path();
            error!(
                marker = %path.display(),
                backup = %self.files.backup_path().display(),
                error = %source,
                "practice marker write failed; backup kept"
            );
            return Err(SessionError::MarkerWrite { path, source });
        }

        let session = PracticeSession {
            session_id,
            loadout,
            save_path,
            save_existed: backup.save_existed,
            started_at,
        };
        info!(
            session_id = %session.session_id,
            loadout_id = %session.loadout.id,
            save = %session.save_path.display(),
            save_existed = session.save_existed,
            "practice session started"
        );
        self.state = SessionState::PracticeActive;
        self.active = Some(session.clone());
        Ok(session)
    }

    fn abandon_begin(&self, captured: Option<LoadoutId>) {
        for (what, result) in [
            ("snapshot", self.files.remove_snapshot()),
            ("backup", self.files.remove_backup()),
        ] {
            if let Err(e) = result {
                warn!(file = what, error = %e, "cannot remove partial session file");
            }
        }
        if let Some(id) = captured {
            if let Err(e) = self.store.delete_loadout(id) {
                warn!(loadout_id = %id, error = %e, "cannot remove captured loadout");
            }
        }
    }

    /// Record one concluded practice fight against the active loadout.
    pub fn record_fight(&mut self, fight: FightResult) -> Result<RunId, SessionError> {
        if self.state != SessionState::PracticeActive {
            return Err(SessionError::NotActive);
        }
        let active = self.active.as_ref().ok_or(SessionError::NotActive)?;

        let run = match self.store.get_loadout(active.loadout.id) {
            Ok(loadout) => NewRunRecord::from_fight(&loadout, fight, Utc::now()),
            Err(StoreError::NotFound(_)) => {
                warn!(loadout_id = %active.loadout.id, "practised loadout was deleted; recording detached run");
                let mut run = NewRunRecord::from_fight(&active.loadout, fight, Utc::now());
                run.loadout_id = None;
                run
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.store.record_run(&run)?)
    }

    /// End practice and put the real save back.
    ///
    /// Works from the on-disk marker, so it also ends a session started by
    /// another process. Calling it with no session returns
    /// [`RestoreReport::NothingToRestore`].
    pub fn end_practice(&mut self) -> Result<RestoreReport, SessionError> {
        self.state = SessionState::Restoring;
        match restore_and_clear(&self.files) {
            Ok(report) => {
                self.state = SessionState::Idle;
                self.active = None;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, dir = %self.files.dir().display(), "practice restore failed; marker kept");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileStatus;
    use crate::model::character::tests::ironclad_starter;
    use crate::model::Outcome;
    use crate::model::run_record::tests::fight;
    use crate::store::tests::test_store;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        manager: SessionManager,
        save: PathBuf,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        let save = dir.path().join("IRONCLAD.autosave");
        fs::write(&save, b"floor 22 progress").unwrap();
        let files = SessionFiles::new(dir.path().join("session"));
        Fixture {
            manager: SessionManager::open(test_store(), files),
            save,
            _dir: dir,
        }
    }

    fn capture(save: &PathBuf) -> PracticeRequest {
        PracticeRequest {
            state: RunState::new(ironclad_starter()),
            save_path: save.clone(),
            target: PracticeTarget::CaptureLive {
                name: "Floor 22".to_string(),
            },
        }
    }

    #[test]
    fn full_lifecycle() {
        let mut fx = fixture();
        assert_eq!(fx.manager.status(), SessionState::Idle);

        let session = fx.manager.begin_practice(capture(&fx.save)).unwrap();
        assert_eq!(fx.manager.status(), SessionState::PracticeActive);
        assert!(fx.manager.is_practice_active());
        assert!(session.save_existed);
        assert_eq!(fx.manager.active_loadout().unwrap().name, "Floor 22");

        fs::write(&fx.save, b"practice clobbered this").unwrap();
        let run = fx
            .manager
            .record_fight(fight("Lagavulin", Outcome::Victory, 8, 14))
            .unwrap();
        let stored = fx.manager.store().get_run(run).unwrap();
        assert_eq!(stored.loadout_id, Some(session.loadout.id));

        let report = fx.manager.end_practice().unwrap();
        assert!(matches!(report, RestoreReport::SaveRestored { bytes: 17, .. }));
        assert_eq!(fs::read(&fx.save).unwrap(), b"floor 22 progress");
        assert!(fx.manager.files().status().is_clean());
        assert_eq!(fx.manager.status(), SessionState::Idle);
    }

    #[test]
    fn begin_twice_is_rejected_without_touching_files() {
        let mut fx = fixture();
        fx.manager.begin_practice(capture(&fx.save)).unwrap();
        let marker_before = fs::read(fx.manager.files().marker_path()).unwrap();
        let snapshot_before = fs::read(fx.manager.files().snapshot_path()).unwrap();

        let err = fx.manager.begin_practice(capture(&fx.save)).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive { .. }));
        assert_eq!(
            fs::read(fx.manager.files().marker_path()).unwrap(),
            marker_before
        );
        assert_eq!(
            fs::read(fx.manager.files().snapshot_path()).unwrap(),
            snapshot_before
        );
        assert_eq!(fx.manager.store().list_loadouts().unwrap().len(), 1);
    }

    #[test]
    fn record_without_session_fails() {
        let mut fx = fixture();
        assert!(matches!(
            fx.manager
                .record_fight(fight("Byrd", Outcome::Defeat, 3, 80)),
            Err(SessionError::NotActive)
        ));
    }

    #[test]
    fn end_is_idempotent() {
        let mut fx = fixture();
        fx.manager.begin_practice(capture(&fx.save)).unwrap();
        assert!(matches!(
            fx.manager.end_practice().unwrap(),
            RestoreReport::SaveUnchanged { .. }
        ));
        assert_eq!(
            fx.manager.end_practice().unwrap(),
            RestoreReport::NothingToRestore
        );
        assert_eq!(fs::read(&fx.save).unwrap(), b"floor 22 progress");
    }

    #[test]
    fn missing_original_save_is_removed_on_end() {
        let mut fx = fixture();
        fs::remove_file(&fx.save).unwrap();
        let session = fx.manager.begin_practice(capture(&fx.save)).unwrap();
        assert!(!session.save_existed);

        fs::write(&fx.save, b"practice save").unwrap();
        assert!(matches!(
            fx.manager.end_practice().unwrap(),
            RestoreReport::SaveRemoved { .. }
        ));
        assert!(!fx.save.exists());
    }

    #[test]
    fn failed_backup_leaves_nothing_behind() {
        let mut fx = fixture();
        // A directory where the save should be cannot be read as bytes.
        fs::remove_file(&fx.save).unwrap();
        fs::create_dir(&fx.save).unwrap();

        let err = fx.manager.begin_practice(capture(&fx.save)).unwrap_err();
        assert!(matches!(err, SessionError::Io { .. }));
        assert_eq!(fx.manager.status(), SessionState::Idle);
        assert!(fx.manager.files().status().is_clean());
        assert!(fx.manager.store().list_loadouts().unwrap().is_empty());
    }

    #[test]
    fn existing_loadout_target_must_exist() {
        let mut fx = fixture();
        let request = PracticeRequest {
            target: PracticeTarget::ExistingLoadout(LoadoutId(77)),
            ..capture(&fx.save)
        };
        assert!(matches!(
            fx.manager.begin_practice(request),
            Err(SessionError::Store(StoreError::NotFound(_)))
        ));
        assert!(fx.manager.files().status().is_clean());
    }

    #[test]
    fn reopened_manager_resumes_session() {
        let mut fx = fixture();
        let session = fx.manager.begin_practice(capture(&fx.save)).unwrap();
        let store = fx.manager.store().clone();
        let files = fx.manager.files().clone();

        let mut reopened = SessionManager::open(store, files);
        assert_eq!(reopened.status(), SessionState::PracticeActive);
        assert_eq!(
            reopened.active_session().map(|s| s.session_id.clone()),
            Some(session.session_id)
        );
        reopened
            .record_fight(fight("Sentries", Outcome::Defeat, 6, 80))
            .unwrap();
        reopened.end_practice().unwrap();
        assert!(reopened.files().status().is_clean());
    }

    #[test]
    fn marker_write_failure_keeps_backup_and_stays_idle() {
        let mut fx = fixture();
        // A directory at the temp path makes the atomic marker write fail.
        let blocker = fx.manager.files().dir().join("practice.marker.tmp");
        fs::create_dir_all(&blocker).unwrap();

        let err = fx.manager.begin_practice(capture(&fx.save)).unwrap_err();
        assert!(matches!(err, SessionError::MarkerWrite { .. }), "{err:?}");
        assert_eq!(fx.manager.status(), SessionState::Idle);
        assert!(fx.manager.active_session().is_none());
        assert_eq!(
            fx.manager.files().status(),
            FileStatus {
                snapshot: true,
                backup: true,
                marker: false,
            }
        );
        assert_eq!(
            fs::read(fx.manager.files().backup_path()).unwrap(),
            b"floor 22 progress"
        );
        assert!(matches!(
            fx.manager
                .record_fight(fight("Hexaghost", Outcome::Victory, 5, 10)),
            Err(SessionError::NotActive)
        ));
    }

    #[test]
    fn unresumable_session_opens_as_restoring() {
        let mut fx = fixture();
        fx.manager.begin_practice(capture(&fx.save)).unwrap();
        let store = fx.manager.store().clone();
        let files = fx.manager.files().clone();
        fs::write(files.snapshot_path(), b"{\"format_version\":").unwrap();

        let mut reopened = SessionManager::open(store, files);
        assert_eq!(reopened.status(), SessionState::Restoring);
        assert!(reopened.active_session().is_none());
        assert!(matches!(
            reopened.begin_practice(capture(&fx.save)),
            Err(SessionError::AlreadyActive { .. })
        ));

        fs::write(&fx.save, b"practice clobbered this").unwrap();
        assert!(matches!(
            reopened.end_practice().unwrap(),
            RestoreReport::SaveRestored { .. }
        ));
        assert_eq!(reopened.status(), SessionState::Idle);
        assert_eq!(fs::read(&fx.save).unwrap(), b"floor 22 progress");
    }

    #[test]
    fn deleted_loadout_resumes_from_marker_copy() {
        let mut fx = fixture();
        let session = fx.manager.begin_practice(capture(&fx.save)).unwrap();
        let store = fx.manager.store().clone();
        let files = fx.manager.files().clone();
        store.delete_loadout(session.loadout.id).unwrap();

        let mut reopened = SessionManager::open(store, files);
        assert_eq!(reopened.status(), SessionState::PracticeActive);
        assert_eq!(reopened.active_loadout().unwrap().name, "Floor 22");
        let run = reopened
            .record_fight(fight("Gremlin_Nob", Outcome::Defeat, 4, 80))
            .unwrap();
        assert_eq!(reopened.store().get_run(run).unwrap().loadout_id, None);
    }
}
