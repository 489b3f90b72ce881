//! Operations exposed to the presentation layer.
//!
//! Everything here returns plain serializable data; formatting and argument
//! parsing belong to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::backup::{BackupManager, DeleteReport, RestoreReport};
use crate::cache::{CacheManager, CacheStats};
use crate::config::AppConfig;
use crate::db::{BackupRecord, Database, DbStats, DeletedFile, TrackedFile};
use crate::error::Result;
use crate::scheduler::{self, CleanupOutcome, ScanReport, Scheduler};
use crate::watcher::FileWatcher;

pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub cache: Arc<CacheManager>,
    pub backups: Arc<BackupManager>,
    pub scheduler: Scheduler,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultStats {
    pub cache: CacheStats,
    pub db: DbStats,
}

impl AppState {
    /// Prepare directories and open the store. Any failure here is fatal for the invocation.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.ensure_ready()?;
        let db = Arc::new(Database::open(&config.db_path())?);
        db.init()?;
        Ok(Self::with_database(config, db))
    }

    /// Build on an already initialized store.
    pub fn with_database(config: AppConfig, db: Arc<Database>) -> Self {
        let cache = Arc::new(CacheManager::new(db.clone(), &config));
        let backups = Arc::new(BackupManager::new(db.clone(), cache.clone(), &config));
        let scheduler = Scheduler::new(db.clone(), cache.clone(), backups.clone(), &config);
        Self {
            config,
            db,
            cache,
            backups,
            scheduler,
        }
    }

    /// Per-invocation housekeeping: pick up new screenshots, then the time-gated cleanup.
    pub fn on_startup(&self) -> Result<(ScanReport, CleanupOutcome)> {
        let scan = self.scan();
        let cleanup = self.run_cleanup(false)?;
        Ok((scan, cleanup))
    }

    // ── Files ───────────────────────────────────────────────

    /// Tracked files, most recently accessed first.
    pub fn list_files(&self) -> Result<Vec<TrackedFile>> {
        self.db.get_all_files()
    }

    pub fn scan(&self) -> ScanReport {
        scheduler::scan_existing_files(&self.config, &self.db)
    }

    /// Path of a cached copy to open, creating one if needed.
    pub fn open_cached(&self, path: &Path) -> Result<Option<PathBuf>> {
        self.cache.get_from_cache(path)
    }

    pub fn watch(&self) -> Result<FileWatcher> {
        let mut watcher = FileWatcher::new();
        watcher.start(&self.config, self.db.clone())?;
        Ok(watcher)
    }

    // ── Delete / Restore ────────────────────────────────────

    /// Delete the `count` most recently used screenshots. Asking for more than
    /// exist deletes what there is; the report's `shortfall` says how many were missing.
    pub fn delete_recent(&self, count: usize) -> Result<DeleteReport> {
        let paths: Vec<PathBuf> = self
            .db
            .get_all_files()?
            .into_iter()
            .take(count)
            .map(|f| PathBuf::from(f.path))
            .collect();
        let mut report = self.backups.delete_files(&paths);
        report.requested = count;
        Ok(report)
    }

    pub fn delete_paths(&self, paths: &[PathBuf]) -> DeleteReport {
        self.backups.delete_files(paths)
    }

    pub fn restore_path(&self, path: &Path) -> Result<PathBuf> {
        self.backups.restore_file(path, true)
    }

    pub fn restore_paths(&self, paths: &[PathBuf]) -> RestoreReport {
        self.backups.restore_files(paths, true)
    }

    pub fn restore_recent(&self, count: usize) -> Result<RestoreReport> {
        self.backups.restore_recent(count, true)
    }

    pub fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        self.backups.list_backups(None)
    }

    pub fn list_recently_deleted(&self, limit: usize) -> Result<Vec<DeletedFile>> {
        self.backups.list_recently_deleted(limit)
    }

    // ── Maintenance ─────────────────────────────────────────

    pub fn run_cleanup(&self, force: bool) -> Result<CleanupOutcome> {
        self.scheduler.run(force)
    }

    pub fn stats(&self) -> Result<VaultStats> {
        Ok(VaultStats {
            cache: self.cache.get_stats()?,
            db: self.db.get_stats()?,
        })
    }
}
