use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::backup::{BackupCleanupReport, BackupManager};
use crate::cache::{path_key, CacheCleanupReport, CacheManager};
use crate::config::AppConfig;
use crate::db::{from_millis, Database, LAST_CLEANUP_KEY};
use crate::error::{Result, VaultError};
use crate::pattern::ScreenshotMatcher;

#[derive(Debug, Clone, Serialize)]
pub enum CleanupOutcome {
    /// Interval has not elapsed; nothing changed.
    Skipped { last_run: DateTime<Utc>, next_due: DateTime<Utc> },
    Ran {
        cache: Option<CacheCleanupReport>,
        backups: Option<BackupCleanupReport>,
        vacuumed: bool,
    },
}

impl CleanupOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, CleanupOutcome::Ran { .. })
    }
}

/// Once-per-invocation gate for the retention sweeps.
pub struct Scheduler {
    db: Arc<Database>,
    cache: Arc<CacheManager>,
    backups: Arc<BackupManager>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        db: Arc<Database>,
        cache: Arc<CacheManager>,
        backups: Arc<BackupManager>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            cache,
            backups,
            interval: config.settings.cleanup_interval(),
        }
    }

    /// When the last sweep finished, if it ever did.
    pub fn last_cleanup(&self) -> Result<Option<DateTime<Utc>>> {
        let value = self.db.get_setting(LAST_CLEANUP_KEY)?;
        Ok(value.and_then(|v| match v.parse::<i64>() {
            Ok(ms) => Some(from_millis(ms)),
            Err(_) => {
                log::warn!("Ignoring unreadable {} value '{}'", LAST_CLEANUP_KEY, v);
                None
            }
        }))
    }

    /// Run cache and backup sweeps, then vacuum, unless the interval has not
    /// elapsed since the last run. `force` skips the check.
    pub fn run(&self, force: bool) -> Result<CleanupOutcome> {
        let now = Utc::now();
        if !force {
            if let Some(last_run) = self.last_cleanup()? {
                let next_due = last_run + self.interval;
                if now < next_due {
                    log::debug!("Cleanup not due until {}", next_due);
                    return Ok(CleanupOutcome::Skipped { last_run, next_due });
                }
            }
        }

        log::info!("Running scheduled cleanup{}", if force { " (forced)" } else { "" });

        let cache = match self.cache.cleanup(None) {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("Cache cleanup failed: {}", e);
                None
            }
        };
        let backups = match self.backups.cleanup_backups() {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("Backup cleanup failed: {}", e);
                None
            }
        };
        // Both sweeps have returned; nothing else writes while this runs.
        let vacuumed = self.backups.vacuum_database();

        self.db
            .set_setting(LAST_CLEANUP_KEY, &Utc::now().timestamp_millis().to_string())?;

        Ok(CleanupOutcome::Ran {
            cache,
            backups,
            vacuumed,
        })
    }
}

// ── Discovery ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub seen: usize,
    pub newly_tracked: usize,
    pub failures: Vec<(String, String)>,
}

/// Scan the configured screenshot directories and track every matching file.
/// Existing rows keep their access time.
pub fn scan_existing_files(config: &AppConfig, db: &Database) -> ScanReport {
    let matcher = ScreenshotMatcher::new(&config.patterns, &config.extensions);
    let mut report = ScanReport::default();

    for dir in &config.screenshot_dirs {
        if !dir.exists() {
            log::debug!("Screenshot directory {} does not exist", dir.display());
            continue;
        }

        for path in collect_files(dir) {
            if !matcher.is_screenshot(&path) {
                continue;
            }
            report.seen += 1;
            match track_file(db, &path) {
                Ok(true) => report.newly_tracked += 1,
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Failed to track {}: {}", path.display(), e);
                    report.failures.push((path_key(&path), e.to_string()));
                }
            }
        }
    }

    log::info!(
        "Screenshot scan completed ({} seen, {} new)",
        report.seen,
        report.newly_tracked
    );
    report
}

/// Record one observed file. Returns true when it was not tracked before.
pub fn track_file(db: &Database, path: &Path) -> Result<bool> {
    let meta = fs::metadata(path).map_err(|e| VaultError::io(path, e))?;
    db.record_discovered_file(
        &path_key(path),
        meta.len(),
        meta.modified().ok().map(DateTime::<Utc>::from),
        Utc::now(),
    )
}

/// Files directly inside `dir`. Unreadable entries are skipped.
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("Failed to read directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, AppConfig, Arc<Database>, Scheduler) {
        let dir = tempdir().unwrap();
        let config = AppConfig::rooted_at(dir.path());
        config.ensure_ready().unwrap();
        let db = Arc::new(test_db());
        let cache = Arc::new(CacheManager::new(db.clone(), &config));
        let backups = Arc::new(BackupManager::new(db.clone(), cache.clone(), &config));
        let scheduler = Scheduler::new(db.clone(), cache, backups, &config);
        (dir, config, db, scheduler)
    }

    #[test]
    fn first_run_always_runs() {
        let (_dir, _config, db, scheduler) = setup();
        assert!(scheduler.last_cleanup().unwrap().is_none());
        let outcome = scheduler.run(false).unwrap();
        assert!(outcome.ran());
        assert!(db.get_setting(LAST_CLEANUP_KEY).unwrap().is_some());
    }

    #[test]
    fn second_run_within_interval_is_noop() {
        let (_dir, _config, db, scheduler) = setup();
        scheduler.run(false).unwrap();
        let stamp = db.get_setting(LAST_CLEANUP_KEY).unwrap();

        let outcome = scheduler.run(false).unwrap();
        assert!(matches!(outcome, CleanupOutcome::Skipped { .. }));
        assert_eq!(db.get_setting(LAST_CLEANUP_KEY).unwrap(), stamp);
    }

    #[test]
    fn force_ignores_interval() {
        let (_dir, _config, _db, scheduler) = setup();
        scheduler.run(false).unwrap();
        assert!(scheduler.run(true).unwrap().ran());
    }

    #[test]
    fn overdue_run_executes() {
        let (_dir, _config, db, scheduler) = setup();
        let long_ago = (Utc::now() - Duration::days(2)).timestamp_millis();
        db.set_setting(LAST_CLEANUP_KEY, &long_ago.to_string()).unwrap();
        assert!(scheduler.run(false).unwrap().ran());
    }

    #[test]
    fn garbage_timestamp_counts_as_never_run() {
        let (_dir, _config, db, scheduler) = setup();
        db.set_setting(LAST_CLEANUP_KEY, "yesterday").unwrap();
        assert!(scheduler.last_cleanup().unwrap().is_none());
        assert!(scheduler.run(false).unwrap().ran());
    }

    #[test]
    fn scan_tracks_only_screenshots() {
        let (_dir, config, db, _scheduler) = setup();
        let shots = &config.screenshot_dirs[0];
        fs::create_dir_all(shots).unwrap();
        fs::write(shots.join("Screenshot 2024-05-01.png"), b"a").unwrap();
        fs::write(shots.join("holiday.png"), b"b").unwrap();
        fs::write(shots.join("Screenshot notes.txt"), b"c").unwrap();

        let report = scan_existing_files(&config, &db);
        assert_eq!(report.seen, 1);
        assert_eq!(report.newly_tracked, 1);

        let again = scan_existing_files(&config, &db);
        assert_eq!(again.newly_tracked, 0);
        assert_eq!(db.get_all_files().unwrap().len(), 1);
    }
}
