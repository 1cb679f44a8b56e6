//! Persistent store for loadouts and practice run history.
//!
//! One SQLite connection per process, shared behind `Arc<Mutex<_>>`. Every
//! write runs in its own transaction. Collection columns are written through
//! the column codec so each carries its format tag.
//!
//! Run records reference loadouts with `ON DELETE SET NULL`: deleting a
//! loadout detaches its history instead of destroying it.

mod history;
mod loadouts;
mod runs;
pub mod schema;

pub use history::{HistoryFilter, HistoryIter};
pub use runs::{EncounterOutcome, GroupCounts, Victories};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use arena_config::{ResolvedConfig, DEFAULT_HISTORY_PAGE_SIZE};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::CodecError;
use crate::model::{CardPool, InvariantViolation};

/// Errors from the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open store at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    #[error("store schema version {found} is newer than supported version {supported}")]
    SchemaMismatch { found: u32, supported: u32 },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("undecodable {table} row {id}: {source}")]
    Decode {
        table: &'static str,
        id: i64,
        #[source]
        source: CodecError,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<InvariantViolation> for StoreError {
    fn from(e: InvariantViolation) -> Self {
        StoreError::ConstraintViolation(e.to_string())
    }
}

impl From<StoreError> for arena_common::Error {
    fn from(e: StoreError) -> Self {
        use arena_common::Error;
        match e {
            StoreError::Unavailable { path, reason } => Error::StoreUnavailable {
                path: path.display().to_string(),
                reason,
            },
            StoreError::SchemaMismatch { found, supported } => {
                Error::SchemaMismatch { found, supported }
            }
            StoreError::ConstraintViolation(msg) => Error::ConstraintViolation(msg),
            StoreError::NotFound(what) => Error::NotFound(what),
            StoreError::Decode { table, id, source } => {
                Error::Decode(format!("{table} row {id}: {source}"))
            }
            StoreError::Sqlite(e) if is_constraint(&e) => Error::ConstraintViolation(e.to_string()),
            StoreError::Sqlite(e) => Error::Storage(e.to_string()),
        }
    }
}

pub(crate) fn is_constraint(e: &rusqlite::Error) -> bool {
    e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
}

/// Shared handle to the arena database.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct ArenaStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    page_size: usize,
    card_pool: Option<Arc<dyn CardPool + Send + Sync>>,
}

impl std::fmt::Debug for ArenaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaStore")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("card_pool", &self.card_pool.is_some())
            .finish()
    }
}

impl ArenaStore {
    /// Open (creating if needed) the store at `path` and migrate it to the
    /// current schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let unavailable = |reason: String| StoreError::Unavailable {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| unavailable(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| unavailable(e.to_string()))?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "arena store opened");
        Ok(store)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn, None)
    }

    /// Open the store named by a resolved configuration, using its page size.
    pub fn open_with_config(resolved: &ResolvedConfig) -> Result<Self, StoreError> {
        Ok(Self::open(Self::default_path(resolved))?
            .with_page_size(resolved.config.history_page_size))
    }

    /// Database path for a resolved configuration.
    pub fn default_path(resolved: &ResolvedConfig) -> PathBuf {
        resolved.db_path.clone()
    }

    fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            page_size: DEFAULT_HISTORY_PAGE_SIZE,
            card_pool: None,
        })
    }

    /// Rows fetched per history page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Check deck contents against `pool` on every loadout write.
    pub fn with_card_pool(mut self, pool: Arc<dyn CardPool + Send + Sync>) -> Self {
        self.card_pool = Some(pool);
        self
    }

    /// File backing this store, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        self.with_conn(|conn| Ok(schema::read_version(conn)?))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let guard = self.lock();
        f(&guard)
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    pub(crate) fn with_tx<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, StoreError>,
    {
        let mut guard = self.lock();
        let tx = guard.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        debug!("transaction committed");
        Ok(out)
    }

    pub(crate) fn card_pool(&self) -> Option<&(dyn CardPool + Send + Sync)> {
        self.card_pool.as_deref()
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Current time truncated to the millisecond precision the store keeps.
pub(crate) fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}
