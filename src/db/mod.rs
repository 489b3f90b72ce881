use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, VaultError};

/// Setting key holding the time of the last completed retention sweep.
pub const LAST_CLEANUP_KEY: &str = "lastCleanupTime";

pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    initialized: AtomicBool,
}

impl Database {
    /// Open (or create) the database file. Tables are not created until `init`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| VaultError::store(path.display().to_string(), e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| VaultError::store(":memory:", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            initialized: AtomicBool::new(false),
        })
    }

    /// Create tables and indexes. Idempotent.
    pub fn init(&self) -> Result<()> {
        let conn = self.lock();
        if self.path.is_some() {
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))
                .map_err(|e| VaultError::store("journal_mode", e))?;
        }
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| VaultError::store("busy_timeout", e))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS files (
                path            TEXT PRIMARY KEY,
                size            INTEGER NOT NULL,
                mtime           INTEGER,
                last_accessed   INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backups (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                original_path   TEXT NOT NULL,
                backup_path     TEXT NOT NULL,
                backup_time     INTEGER NOT NULL,
                size            INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deleted_files (
                path            TEXT PRIMARY KEY,
                deleted_at      INTEGER NOT NULL,
                backup_path     TEXT NOT NULL,
                size            INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_last_accessed ON files(last_accessed);
            CREATE INDEX IF NOT EXISTS idx_deleted_at ON deleted_files(deleted_at);
            CREATE INDEX IF NOT EXISTS idx_deleted_backup_path ON deleted_files(backup_path);
            CREATE INDEX IF NOT EXISTS idx_backups_original ON backups(original_path);
            ",
        )
        .map_err(|e| VaultError::store("schema", e))?;
        self.initialized.store(true, Ordering::SeqCst);
        log::debug!("Database ready at {}", self.display_path());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn display_path(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string())
    }

    /// One writer at a time. A panic in another holder does not poison the store.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for a store operation, failing if `init` has not run.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        if !self.is_initialized() {
            return Err(VaultError::NotInitialized);
        }
        Ok(self.lock())
    }
}

// ── Timestamp helpers ───────────────────────────────────────

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

// ── Sub-modules ─────────────────────────────────────────────

mod backups;
mod deleted;
mod files;
mod models;
mod settings;
mod storage;

// ── Re-exports ──────────────────────────────────────────────

pub use models::{BackupRecord, DbStats, DeletedFile, Setting, TableStats, TrackedFile};

#[cfg(test)]
impl Database {
    /// Run raw SQL, e.g. to install failure triggers.
    pub(crate) fn execute_raw(&self, sql: &str) {
        self.lock().execute_batch(sql).unwrap();
    }
}

#[cfg(test)]
pub(crate) fn test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.init().unwrap();
    db
}
