//! Recoverable deletion and backup retention.
//!
//! Deleting a screenshot moves it through these states:
//!
//! ```text
//! Present ──delete──▶ BackedUp ──restore──▶ Present
//!                        │
//!                        └──retention sweep──▶ Purged
//! ```
//!
//! The backup copy and its row are always written before the origin is
//! removed. If the process dies between those steps the origin is still on
//! disk, or the backup row still points at a complete copy.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;

use crate::cache::{path_key, CacheManager};
use crate::config::AppConfig;
use crate::db::{BackupRecord, Database, DeletedFile, TrackedFile};
use crate::error::{Result, VaultError};

/// Somewhere outside the backup directory a deleted file may still be found,
/// e.g. the OS recycle bin. Only consulted when the recorded backup is gone.
pub trait RecoverySource: Send + Sync {
    fn locate(&self, original_path: &Path) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    /// Tracked and on disk
    Present,
    /// Origin removed, a backup is recorded
    BackedUp,
    /// Nothing known. Covers both never-tracked paths and purged ones: a purge
    /// drops the backup row and its marker, so no record of the path survives.
    Untracked,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub requested: usize,
    pub succeeded: Vec<BackupRecord>,
    pub failed: Vec<(String, String)>,
    /// Paths that did not exist and were left alone
    pub skipped: Vec<String>,
    pub backup_dir: PathBuf,
}

impl DeleteReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// How many requested files could not be deleted for any reason.
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.succeeded.len())
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "Deleted {} of {} file(s), backups in {}",
            self.succeeded.len(),
            self.requested,
            self.backup_dir.display()
        );
        if !self.skipped.is_empty() {
            text.push_str(&format!(", {} missing", self.skipped.len()));
        }
        if !self.failed.is_empty() {
            text.push_str(&format!(", {} failed", self.failed.len()));
        }
        text
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RestoreReport {
    pub fn success_count(&self) -> usize {
        self.restored.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            format!("Restored {} file(s)", self.restored.len())
        } else {
            format!(
                "Restored {} file(s), {} failed",
                self.restored.len(),
                self.failed.len()
            )
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupCleanupReport {
    /// Backup paths purged
    pub removed: Vec<String>,
    pub failures: Vec<(String, String)>,
    pub bytes_freed: u64,
    /// Deletion markers dropped because their backup was purged
    pub markers_cleared: usize,
    /// Beyond the count limit but not yet old enough
    pub retained_young: usize,
}

impl BackupCleanupReport {
    pub fn success_count(&self) -> usize {
        self.removed.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Backup cleanup: {} removed, {} kept (too young), {} failed, {} bytes freed",
            self.removed.len(),
            self.retained_young,
            self.failures.len(),
            self.bytes_freed
        )
    }
}

pub struct BackupManager {
    db: Arc<Database>,
    cache: Arc<CacheManager>,
    backup_dir: PathBuf,
    max_backups: usize,
    max_age: Duration,
    fallback: Option<Box<dyn RecoverySource>>,
    remove_origin: fn(&Path) -> io::Result<()>,
}

fn remove_origin_file(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

impl BackupManager {
    pub fn new(db: Arc<Database>, cache: Arc<CacheManager>, config: &AppConfig) -> Self {
        Self {
            db,
            cache,
            backup_dir: config.backup_dir.clone(),
            max_backups: config.settings.max_backups,
            max_age: config.settings.backup_max_age(),
            fallback: None,
            remove_origin: remove_origin_file,
        }
    }

    pub fn with_recovery_source(mut self, source: Box<dyn RecoverySource>) -> Self {
        self.fallback = Some(source);
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn todays_dir(&self) -> PathBuf {
        self.backup_dir
            .join(Local::now().format("%Y-%m-%d").to_string())
    }

    // ── Deletion ────────────────────────────────────────────

    /// Back up and delete each path. Missing paths are skipped; failures are
    /// recorded per file and never stop the batch.
    pub fn delete_files(&self, paths: &[PathBuf]) -> DeleteReport {
        let day_dir = self.todays_dir();
        let mut report = DeleteReport {
            requested: paths.len(),
            backup_dir: day_dir.clone(),
            ..DeleteReport::default()
        };

        for origin in paths {
            let key = path_key(origin);
            if !origin.is_file() {
                log::info!("Skipping {}: file does not exist", origin.display());
                // A row for a vanished file is stale.
                if let Err(e) = self.db.delete_file(&key) {
                    log::warn!("Could not drop stale row {}: {}", key, e);
                }
                report.skipped.push(key);
                continue;
            }
            match self.delete_one(origin, &day_dir) {
                Ok(record) => {
                    log::info!("Deleted {} (backup: {})", key, record.backup_path);
                    report.succeeded.push(record);
                }
                Err(e) => {
                    log::error!("Failed to delete {}: {}", key, e);
                    report.failed.push((key, e.to_string()));
                }
            }
        }

        log::info!("{}", report.summary());
        report
    }

    fn delete_one(&self, origin: &Path, day_dir: &Path) -> Result<BackupRecord> {
        let key = path_key(origin);
        let size = fs::metadata(origin).map_err(|e| VaultError::io(origin, e))?.len();

        fs::create_dir_all(day_dir).map_err(|e| VaultError::io(day_dir, e))?;
        let file_name = origin
            .file_name()
            .ok_or_else(|| VaultError::NotFound(format!("file name of {}", key)))?;
        let target = unique_path(day_dir, &file_name.to_string_lossy());

        copy_durably(origin, &target)?;
        let target_key = path_key(&target);
        let now = Utc::now();

        let id = match self.db.add_backup(&key, &target_key, size, now) {
            Ok(id) => id,
            Err(e) => {
                discard_copy(&target);
                return Err(e);
            }
        };

        if let Err(e) = (self.remove_origin)(origin) {
            // Origin is intact; undo this item's backup so the states stay distinct.
            if let Err(undo) = self.db.remove_backup_by_id(id) {
                log::error!("Could not roll back backup row #{} ({}): {}", id, target_key, undo);
            }
            discard_copy(&target);
            return Err(VaultError::io(origin, e));
        }

        if let Err(e) = self.db.add_deleted_file(&key, &target_key, size, now) {
            // Still restorable through the backups table.
            log::error!("Deletion marker for {} not recorded: {}", key, e);
        }

        if let Err(e) = self.cache.delete_from_cache(origin) {
            log::warn!("Cache cleanup after deleting {} failed: {}", key, e);
            if let Err(e) = self.db.delete_file(&key) {
                log::error!("Could not drop index row for {}: {}", key, e);
            }
        }

        Ok(BackupRecord {
            id,
            original_path: key,
            backup_path: target_key,
            size,
            created_at: now,
        })
    }

    // ── Restoration ─────────────────────────────────────────

    /// Copy the recorded backup of `origin` back into place.
    /// Refuses to overwrite an existing file.
    pub fn restore_file(&self, origin: &Path, recache: bool) -> Result<PathBuf> {
        let key = path_key(origin);

        let recorded = match self.db.get_deleted_file(&key)? {
            Some(marker) => Some(marker.backup_path),
            None => self
                .db
                .get_backups(Some(&key))?
                .into_iter()
                .next()
                .map(|b| b.backup_path),
        };
        let recorded = recorded.ok_or_else(|| VaultError::NotFound(format!("backup of {}", key)))?;

        let mut source = PathBuf::from(&recorded);
        if !source.is_file() {
            match self.fallback.as_ref().and_then(|f| f.locate(origin)) {
                Some(found) if found.is_file() => {
                    log::info!("Backup {} missing, restoring {} from {}", recorded, key, found.display());
                    source = found;
                }
                _ => {
                    return Err(VaultError::io(
                        &source,
                        io::Error::new(io::ErrorKind::NotFound, "backup file is missing"),
                    ));
                }
            }
        }

        if origin.exists() {
            return Err(VaultError::io(
                origin,
                io::Error::new(io::ErrorKind::AlreadyExists, "a file already exists at the original path"),
            ));
        }
        if let Some(parent) = origin.parent() {
            fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
        }
        copy_durably(&source, origin)?;

        let size = match self.track_restored(origin, &key) {
            Ok(size) => size,
            Err(e) => {
                // Leave the path free so the restore can be retried.
                discard_copy(origin);
                if let Err(undo) = self.db.delete_file(&key) {
                    log::error!("Could not drop index row for {}: {}", key, undo);
                }
                return Err(e);
            }
        };

        if recache {
            if let Err(e) = self.cache.add_to_cache(origin, size) {
                log::warn!("Restored {} but could not cache it: {}", key, e);
            }
        }

        log::info!("Restored {} from {}", key, source.display());
        Ok(origin.to_path_buf())
    }

    fn track_restored(&self, origin: &Path, key: &str) -> Result<u64> {
        let meta = fs::metadata(origin).map_err(|e| VaultError::io(origin, e))?;
        self.db.add_file(&TrackedFile {
            path: key.to_string(),
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            last_accessed: Utc::now(),
        })?;
        self.db.remove_from_deleted_files(key)?;
        Ok(meta.len())
    }

    pub fn restore_files(&self, paths: &[PathBuf], recache: bool) -> RestoreReport {
        let mut report = RestoreReport::default();
        for origin in paths {
            self.restore_into(origin, recache, &mut report);
        }
        log::info!("{}", report.summary());
        report
    }

    /// Restore the `count` most recently deleted files.
    pub fn restore_recent(&self, count: usize, recache: bool) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        for marker in self.db.get_recently_deleted(count)? {
            self.restore_into(Path::new(&marker.path), recache, &mut report);
        }
        log::info!("{}", report.summary());
        Ok(report)
    }

    fn restore_into(&self, origin: &Path, recache: bool, report: &mut RestoreReport) {
        let key = path_key(origin);
        match self.restore_file(origin, recache) {
            Ok(_) => report.restored.push(key),
            Err(e) => {
                log::error!("Failed to restore {}: {}", key, e);
                report.failed.push((key, e.to_string()));
            }
        }
    }

    pub fn list_backups(&self, origin: Option<&Path>) -> Result<Vec<BackupRecord>> {
        let key = origin.map(path_key);
        self.db.get_backups(key.as_deref())
    }

    pub fn list_recently_deleted(&self, limit: usize) -> Result<Vec<DeletedFile>> {
        self.db.get_recently_deleted(limit)
    }

    pub fn state_of(&self, origin: &Path) -> Result<LifecycleState> {
        let key = path_key(origin);
        if self.db.get_file(&key)?.is_some() && origin.exists() {
            return Ok(LifecycleState::Present);
        }
        if self.db.get_deleted_file(&key)?.is_some() || !self.db.get_backups(Some(&key))?.is_empty() {
            return Ok(LifecycleState::BackedUp);
        }
        Ok(LifecycleState::Untracked)
    }

    // ── Retention ───────────────────────────────────────────

    /// Purge backups that are both beyond the newest `max_backups` and older
    /// than the age limit. Backups within the count limit are always kept.
    pub fn cleanup_backups(&self) -> Result<BackupCleanupReport> {
        let mut backups = self.db.get_backups(None)?;
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let cutoff = Utc::now() - self.max_age;
        let mut report = BackupCleanupReport::default();

        for backup in backups.iter().skip(self.max_backups) {
            if backup.created_at >= cutoff {
                report.retained_young += 1;
                continue;
            }
            match self.purge(backup) {
                Ok((freed, markers)) => {
                    report.bytes_freed += freed;
                    report.markers_cleared += markers;
                    report.removed.push(backup.backup_path.clone());
                }
                Err(e) => {
                    log::warn!("Failed to purge backup {}: {}", backup.backup_path, e);
                    report.failures.push((backup.backup_path.clone(), e.to_string()));
                }
            }
        }

        self.remove_empty_day_dirs();
        log::info!("{}", report.summary());
        Ok(report)
    }

    fn purge(&self, backup: &BackupRecord) -> Result<(u64, usize)> {
        let path = Path::new(&backup.backup_path);
        let freed = match fs::metadata(path) {
            Ok(meta) => {
                fs::remove_file(path).map_err(|e| VaultError::io(path, e))?;
                meta.len()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(VaultError::io(path, e)),
        };
        self.db.remove_backup(&backup.backup_path)?;
        let markers = self.db.remove_deleted_by_backup_path(&backup.backup_path)?;
        Ok((freed, markers))
    }

    fn remove_empty_day_dirs(&self) {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                // Fails harmlessly when not empty.
                let _ = fs::remove_dir(&path);
            }
        }
    }

    /// Compact the store. Failures are logged, not returned.
    pub fn vacuum_database(&self) -> bool {
        match self.db.vacuum() {
            Ok(()) => {
                log::info!("Database vacuumed");
                true
            }
            Err(e) => {
                log::warn!("Vacuum failed: {}", e);
                false
            }
        }
    }
}

/// `dir/name`, or `dir/<stem>-<n>.<ext>` when taken.
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = Utc::now().timestamp_millis();
    loop {
        let candidate = dir.join(format!("{}-{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Copy and fsync so the copy survives a crash right after this returns.
fn copy_durably(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|e| VaultError::io(from, e))?;
    File::open(to)
        .and_then(|f| f.sync_all())
        .map_err(|e| VaultError::io(to, e))
}

fn discard_copy(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Could not remove copy {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        db: Arc<Database>,
        backups: BackupManager,
    }

    fn fixture(max_backups: usize, max_age_days: u32) -> Fixture {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::rooted_at(dir.path());
        config.settings.max_backups = max_backups;
        config.settings.max_backup_age_days = max_age_days;
        config.ensure_ready().unwrap();
        fs::create_dir_all(&config.screenshot_dirs[0]).unwrap();
        let db = Arc::new(test_db());
        let cache = Arc::new(CacheManager::new(db.clone(), &config));
        let backups = BackupManager::new(db.clone(), cache, &config);
        Fixture { dir, db, backups }
    }

    impl Fixture {
        fn shot(&self, name: &str, bytes: &[u8]) -> PathBuf {
            let path = self.dir.path().join("screenshots").join(name);
            fs::write(&path, bytes).unwrap();
            path
        }

        /// A backup row plus file, `age_days` old.
        fn aged_backup(&self, name: &str, age_days: i64) -> String {
            let path = self.dir.path().join("backups").join(name);
            fs::write(&path, b"x").unwrap();
            let key = path_key(&path);
            self.db
                .add_backup(&format!("/orig/{}", name), &key, 1, Utc::now() - Duration::days(age_days))
                .unwrap();
            key
        }
    }

    #[test]
    fn unique_path_avoids_collisions() {
        let dir = tempdir().unwrap();
        let first = unique_path(dir.path(), "shot.png");
        assert_eq!(first, dir.path().join("shot.png"));
        fs::write(&first, b"a").unwrap();
        let second = unique_path(dir.path(), "shot.png");
        assert_ne!(second, first);
        assert!(second.to_string_lossy().ends_with(".png"));
    }

    #[test]
    fn delete_then_restore_round_trip() {
        let f = fixture(10, 30);
        let origin = f.shot("shot2.png", b"original bytes");

        let report = f.backups.delete_files(&[origin.clone()]);
        assert_eq!(report.success_count(), 1);
        let record = &report.succeeded[0];
        assert_eq!(record.original_path, path_key(&origin));
        assert_eq!(Path::new(&record.backup_path).file_name().unwrap(), "shot2.png");
        assert!(!origin.exists());
        assert_eq!(f.backups.state_of(&origin).unwrap(), LifecycleState::BackedUp);

        f.backups.restore_file(&origin, false).unwrap();
        assert_eq!(fs::read(&origin).unwrap(), b"original bytes");
        assert!(f.db.get_deleted_file(&path_key(&origin)).unwrap().is_none());
        assert_eq!(f.backups.state_of(&origin).unwrap(), LifecycleState::Present);
    }

    #[test]
    fn directories_are_skipped() {
        let f = fixture(10, 30);
        let dir_path = f.dir.path().join("screenshots").join("folder.png");
        fs::create_dir_all(&dir_path).unwrap();
        let report = f.backups.delete_files(&[dir_path]);
        assert_eq!(report.skipped.len(), 1);
        assert!(f.db.get_backups(None).unwrap().is_empty());
    }

    fn refuse_locked(path: &Path) -> io::Result<()> {
        if path.file_name().map_or(false, |n| n.to_string_lossy().starts_with("locked")) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
        }
        fs::remove_file(path)
    }

    #[test]
    fn failed_origin_removal_rolls_back_only_that_item() {
        let mut f = fixture(10, 30);
        f.backups.remove_origin = refuse_locked;
        let locked = f.shot("locked.png", b"keep me");
        let free = f.shot("free.png", b"go");

        let report = f.backups.delete_files(&[locked.clone(), free.clone()]);

        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed[0].0, path_key(&locked));
        assert_eq!(fs::read(&locked).unwrap(), b"keep me");
        assert!(f.db.get_backups(Some(&path_key(&locked))).unwrap().is_empty());
        assert!(f.db.get_deleted_file(&path_key(&locked)).unwrap().is_none());
        assert!(!report.backup_dir.join("locked.png").exists());

        assert_eq!(report.success_count(), 1);
        assert!(!free.exists());
        assert!(report.backup_dir.join("free.png").exists());
        assert_eq!(f.db.get_backups(Some(&path_key(&free))).unwrap().len(), 1);
    }

    #[test]
    fn rollback_keeps_older_backup_rows() {
        let mut f = fixture(10, 30);
        let origin = f.shot("locked.png", b"v1");
        f.backups.delete_files(&[origin.clone()]);
        fs::write(&origin, b"v2").unwrap();

        f.backups.remove_origin = refuse_locked;
        let report = f.backups.delete_files(&[origin.clone()]);
        assert_eq!(report.failure_count(), 1);

        let left = f.db.get_backups(Some(&path_key(&origin))).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(fs::read(&left[0].backup_path).unwrap(), b"v1");
    }

    #[test]
    fn failed_restore_bookkeeping_frees_the_path() {
        let f = fixture(10, 30);
        let origin = f.shot("shot.png", b"bytes");
        f.backups.delete_files(&[origin.clone()]);

        f.db.execute_raw(
            "CREATE TRIGGER refuse_files BEFORE INSERT ON files
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        );
        let err = f.backups.restore_file(&origin, false).unwrap_err();
        assert!(matches!(err, VaultError::Store { .. }));
        assert!(!origin.exists());
        assert!(f.db.get_file(&path_key(&origin)).unwrap().is_none());
        assert!(f.db.get_deleted_file(&path_key(&origin)).unwrap().is_some());

        f.db.execute_raw("DROP TRIGGER refuse_files;");
        f.backups.restore_file(&origin, false).unwrap();
        assert_eq!(fs::read(&origin).unwrap(), b"bytes");
    }

    #[test]
    fn purged_path_reads_as_untracked() {
        let f = fixture(10, 30);
        let origin = f.shot("shot.png", b"bytes");
        let report = f.backups.delete_files(&[origin.clone()]);
        assert_eq!(f.backups.state_of(&origin).unwrap(), LifecycleState::BackedUp);

        f.backups.purge(&report.succeeded[0]).unwrap();
        assert_eq!(f.backups.state_of(&origin).unwrap(), LifecycleState::Untracked);
        assert!(f.backups.list_recently_deleted(10).unwrap().is_empty());
    }

    #[test]
    fn restore_without_backup_is_not_found() {
        let f = fixture(10, 30);
        let err = f
            .backups
            .restore_file(&f.dir.path().join("never.png"), false)
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[test]
    fn restore_with_missing_backup_file_fails_without_tracking() {
        let f = fixture(10, 30);
        let origin = f.shot("shot.png", b"data");
        let report = f.backups.delete_files(&[origin.clone()]);
        fs::remove_file(&report.succeeded[0].backup_path).unwrap();

        let err = f.backups.restore_file(&origin, false).unwrap_err();
        assert!(err.is_missing_file());
        assert!(f.db.get_file(&path_key(&origin)).unwrap().is_none());
        assert!(f.db.get_deleted_file(&path_key(&origin)).unwrap().is_some());
    }

    #[test]
    fn restore_uses_recovery_source_when_backup_missing() {
        struct Bin(PathBuf);
        impl RecoverySource for Bin {
            fn locate(&self, _original: &Path) -> Option<PathBuf> {
                Some(self.0.clone())
            }
        }

        let f = fixture(10, 30);
        let origin = f.shot("shot.png", b"data");
        let report = f.backups.delete_files(&[origin.clone()]);
        fs::remove_file(&report.succeeded[0].backup_path).unwrap();
        let binned = f.dir.path().join("bin-copy.png");
        fs::write(&binned, b"data").unwrap();

        let Fixture { dir: _dir, db, backups } = f;
        let backups = backups.with_recovery_source(Box::new(Bin(binned)));
        backups.restore_file(&origin, false).unwrap();
        assert_eq!(fs::read(&origin).unwrap(), b"data");
        assert!(db.get_file(&path_key(&origin)).unwrap().is_some());
    }

    #[test]
    fn restore_refuses_to_overwrite() {
        let f = fixture(10, 30);
        let origin = f.shot("shot.png", b"old");
        f.backups.delete_files(&[origin.clone()]);
        fs::write(&origin, b"new file in the way").unwrap();

        let err = f.backups.restore_file(&origin, false).unwrap_err();
        assert!(matches!(err, VaultError::Io { ref source, .. } if source.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read(&origin).unwrap(), b"new file in the way");
    }

    #[test]
    fn restore_falls_back_to_backup_rows_without_marker() {
        let f = fixture(10, 30);
        let origin = f.shot("shot.png", b"bytes");
        f.backups.delete_files(&[origin.clone()]);
        f.db.remove_from_deleted_files(&path_key(&origin)).unwrap();

        f.backups.restore_file(&origin, false).unwrap();
        assert_eq!(fs::read(&origin).unwrap(), b"bytes");
    }

    #[test]
    fn retention_purges_old_backup_beyond_count() {
        let f = fixture(2, 30);
        let newest = f.aged_backup("a.png", 1);
        let second = f.aged_backup("b.png", 2);
        let old = f.aged_backup("c.png", 40);
        f.db.add_deleted_file("/orig/c.png", &old, 1, Utc::now()).unwrap();

        let report = f.backups.cleanup_backups().unwrap();
        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.markers_cleared, 1);
        assert!(!Path::new(&old).exists());
        assert!(Path::new(&newest).exists());
        assert!(Path::new(&second).exists());
        assert!(f.db.get_deleted_file("/orig/c.png").unwrap().is_none());
    }

    #[test]
    fn retention_keeps_young_backup_beyond_count() {
        let f = fixture(2, 30);
        f.aged_backup("a.png", 1);
        f.aged_backup("b.png", 2);
        let young = f.aged_backup("c.png", 5);

        let report = f.backups.cleanup_backups().unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.retained_young, 1);
        assert!(Path::new(&young).exists());
        assert_eq!(f.db.get_backups(None).unwrap().len(), 3);
    }

    #[test]
    fn retention_keeps_backups_within_count_regardless_of_age() {
        let f = fixture(3, 30);
        let a = f.aged_backup("a.png", 100);
        let b = f.aged_backup("b.png", 200);
        let c = f.aged_backup("c.png", 300);

        let report = f.backups.cleanup_backups().unwrap();
        assert!(report.removed.is_empty());
        for key in [a, b, c] {
            assert!(Path::new(&key).exists());
        }
        assert_eq!(f.db.get_backups(None).unwrap().len(), 3);
    }

    #[test]
    fn retention_drops_row_even_if_file_already_gone() {
        let f = fixture(0, 1);
        let key = f.aged_backup("a.png", 5);
        fs::remove_file(&key).unwrap();

        let report = f.backups.cleanup_backups().unwrap();
        assert_eq!(report.removed, vec![key]);
        assert_eq!(report.bytes_freed, 0);
        assert!(f.db.get_backups(None).unwrap().is_empty());
    }

    #[test]
    fn vacuum_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let config = AppConfig::rooted_at(dir.path());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(CacheManager::new(db.clone(), &config));
        let backups = BackupManager::new(db, cache, &config);
        assert!(!backups.vacuum_database());
    }
}
