//! Private copies of tracked screenshots.
//!
//! Each origin gets artifacts named `<stem>-<hash>-<millis>.<ext>` in the cache
//! directory, where `<hash>` is derived from the full origin path. Several
//! artifacts for one origin can exist briefly; lookups prefer the newest one
//! that is still on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::AppConfig;
use crate::db::{Database, TrackedFile};
use crate::error::{Result, VaultError};

pub struct CacheManager {
    db: Arc<Database>,
    cache_dir: PathBuf,
    max_age: Duration,
    max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheCleanupReport {
    /// Origin paths whose entry was removed
    pub removed: Vec<String>,
    pub failures: Vec<(String, String)>,
    pub bytes_freed: u64,
    /// How many of `removed` lost their artifacts to get under the size limit.
    /// Their index rows are kept.
    pub evicted_for_size: usize,
    /// Artifacts with no index row, removed before any tracked entry
    pub orphans_removed: usize,
}

impl CacheCleanupReport {
    pub fn success_count(&self) -> usize {
        self.removed.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Cache cleanup: {} removed ({} for size), {} orphans, {} failed, {} bytes freed",
            self.removed.len(),
            self.evicted_for_size,
            self.orphans_removed,
            self.failures.len(),
            self.bytes_freed
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_bytes: u64,
    pub entry_count: usize,
    pub tracked_files: usize,
    pub oldest: Option<CacheEntryInfo>,
    pub newest: Option<CacheEntryInfo>,
}

/// Key used in the `files` table for an origin path.
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `<stem>-<hash>-`, shared by every artifact of one origin.
fn artifact_prefix(origin: &Path) -> String {
    let stem: String = origin
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let digest = Sha256::digest(path_key(origin).as_bytes());
    let hash: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}-", stem, hash)
}

fn artifact_name(origin: &Path, millis: i64) -> String {
    let ext = origin
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("{}{}{}", artifact_prefix(origin), millis, ext)
}

fn file_modified(meta: &fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

impl CacheManager {
    pub fn new(db: Arc<Database>, config: &AppConfig) -> Self {
        Self {
            db,
            cache_dir: config.cache_dir.clone(),
            max_age: config.settings.cache_max_age(),
            max_bytes: config.settings.max_cache_bytes(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ensure_ready(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).map_err(|e| VaultError::io(&self.cache_dir, e))
    }

    /// Existing artifacts for `origin`, newest first.
    pub fn find_cached(&self, origin: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VaultError::io(&self.cache_dir, e)),
        };

        let prefix = artifact_prefix(origin);
        let mut found: Vec<(i64, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let rest = name.strip_prefix(&prefix)?;
                let millis = rest.split('.').next()?.parse::<i64>().ok()?;
                Some((millis, entry.path()))
            })
            .filter(|(_, path)| path.is_file())
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Copy `origin` into the cache and mark it accessed now.
    pub fn add_to_cache(&self, origin: &Path, size: u64) -> Result<PathBuf> {
        self.ensure_ready()?;
        let now = Utc::now();

        let mut millis = now.timestamp_millis();
        let mut target = self.cache_dir.join(artifact_name(origin, millis));
        while target.exists() {
            millis += 1;
            target = self.cache_dir.join(artifact_name(origin, millis));
        }

        let meta = fs::metadata(origin).map_err(|e| VaultError::io(origin, e))?;
        fs::copy(origin, &target).map_err(|e| VaultError::io(origin, e))?;

        self.db.add_file(&TrackedFile {
            path: path_key(origin),
            size,
            modified: file_modified(&meta),
            last_accessed: now,
        })?;

        // Older copies of the same origin are now stale.
        for stale in self.find_cached(origin)?.into_iter().filter(|p| *p != target) {
            if let Err(e) = fs::remove_file(&stale) {
                log::debug!("Could not remove stale cache file {}: {}", stale.display(), e);
            }
        }

        log::debug!("Cached {} as {}", origin.display(), target.display());
        Ok(target)
    }

    /// Serve the cached copy, creating it lazily for tracked files.
    /// A tracked file whose origin vanished is dropped from the index and reported as `None`.
    pub fn get_from_cache(&self, origin: &Path) -> Result<Option<PathBuf>> {
        let key = path_key(origin);

        if let Some(hit) = self.find_cached(origin)?.into_iter().next() {
            log::debug!("Cache hit for {}", origin.display());
            self.db.update_file_access(&key, None)?;
            return Ok(Some(hit));
        }

        let tracked = match self.db.get_file(&key)? {
            Some(tracked) => tracked,
            None => return Ok(None),
        };

        log::debug!("Cache miss for {}", origin.display());
        match self.add_to_cache(origin, tracked.size) {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.is_missing_file() => {
                log::info!("Origin {} is gone; dropping it from the index", origin.display());
                self.db.delete_file(&key)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Logical removal: drops the index row, leaves artifacts on disk.
    pub fn remove_from_cache(&self, origin: &Path) -> Result<bool> {
        self.db.delete_file(&path_key(origin))
    }

    /// Physical removal of every artifact for `origin` plus its index row.
    /// Returns bytes freed.
    pub fn delete_from_cache(&self, origin: &Path) -> Result<u64> {
        let freed = self.remove_artifacts(origin)?;
        self.db.delete_file(&path_key(origin))?;
        Ok(freed)
    }

    fn remove_artifacts(&self, origin: &Path) -> Result<u64> {
        let mut freed = 0;
        for artifact in self.find_cached(origin)? {
            let size = fs::metadata(&artifact).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(&artifact) {
                Ok(()) => freed += size,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(VaultError::io(&artifact, e)),
            }
        }
        Ok(freed)
    }

    /// Expire entries not accessed within `max_age` (default: configured expiration),
    /// then shrink the directory under the size limit.
    ///
    /// The size pass only touches artifacts on disk: orphaned artifacts go first,
    /// then the artifacts of the least recently accessed entries. Rows survive it,
    /// so a later `get_from_cache` recreates the copy.
    pub fn cleanup(&self, max_age: Option<Duration>) -> Result<CacheCleanupReport> {
        let cutoff = Utc::now() - max_age.unwrap_or(self.max_age);
        let mut report = CacheCleanupReport::default();

        for entry in self.db.get_files_by_date(cutoff)? {
            self.expire(&entry.path, &mut report);
        }

        if let Some(limit) = self.max_bytes {
            let mut total = self.directory_size();
            if total > limit {
                let tracked = self.db.get_all_files()?;
                total = total.saturating_sub(self.remove_orphans(&tracked, &mut report));

                // Oldest access first.
                for entry in tracked.iter().rev() {
                    if total <= limit {
                        break;
                    }
                    let origin = Path::new(&entry.path);
                    match self.find_cached(origin) {
                        Ok(found) if found.is_empty() => continue,
                        Ok(_) => {}
                        Err(e) => {
                            report.failures.push((entry.path.clone(), e.to_string()));
                            continue;
                        }
                    }
                    match self.remove_artifacts(origin) {
                        Ok(freed) => {
                            report.bytes_freed += freed;
                            report.removed.push(entry.path.clone());
                            report.evicted_for_size += 1;
                            total = total.saturating_sub(freed);
                        }
                        Err(e) => {
                            log::warn!("Failed to evict cache copy of {}: {}", entry.path, e);
                            report.failures.push((entry.path.clone(), e.to_string()));
                        }
                    }
                }
            }
        }

        if !report.removed.is_empty() || !report.failures.is_empty() || report.orphans_removed > 0 {
            log::info!("{}", report.summary());
        }
        Ok(report)
    }

    fn expire(&self, origin: &str, report: &mut CacheCleanupReport) {
        match self.delete_from_cache(Path::new(origin)) {
            Ok(freed) => {
                report.bytes_freed += freed;
                report.removed.push(origin.to_string());
            }
            Err(e) => {
                log::warn!("Failed to expire cache entry {}: {}", origin, e);
                report.failures.push((origin.to_string(), e.to_string()));
            }
        }
    }

    /// Remove artifacts that belong to no tracked entry. Returns bytes freed.
    fn remove_orphans(&self, tracked: &[TrackedFile], report: &mut CacheCleanupReport) -> u64 {
        let prefixes: Vec<String> = tracked
            .iter()
            .map(|f| artifact_prefix(Path::new(&f.path)))
            .collect();
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut freed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                continue;
            }
            let size = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => continue,
            };
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    freed += size;
                    report.orphans_removed += 1;
                }
                Err(e) => log::debug!("Could not remove orphaned cache file {}: {}", name, e),
            }
        }
        report.bytes_freed += freed;
        freed
    }

    fn directory_size(&self) -> u64 {
        fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.metadata().ok())
                    .filter(|m| m.is_file())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn get_stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats {
            tracked_files: self.db.get_all_files()?.len(),
            ..CacheStats::default()
        };

        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(VaultError::io(&self.cache_dir, e)),
        };

        for entry in entries.flatten() {
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let info = CacheEntryInfo {
                path: entry.path(),
                size: meta.len(),
                modified: file_modified(&meta),
            };
            stats.total_bytes += info.size;
            stats.entry_count += 1;

            if stats.oldest.as_ref().map_or(true, |o| info.modified < o.modified) {
                stats.oldest = Some(info.clone());
            }
            if stats.newest.as_ref().map_or(true, |n| info.modified > n.modified) {
                stats.newest = Some(info);
            }
        }

        Ok(stats)
    }
}
