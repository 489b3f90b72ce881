use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::{Result, VaultError};
use crate::pattern::ScreenshotMatcher;
use crate::scheduler::track_file;

/// Tracks screenshots as they appear in the configured directories.
///
/// Events are delivered on the debouncer's single thread, and every write
/// goes through the database lock, so observations never interleave.
pub struct FileWatcher {
    debouncer: Option<notify_debouncer_mini::Debouncer<RecommendedWatcher>>,
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWatcher {
    pub fn new() -> Self {
        Self { debouncer: None }
    }

    /// Start watching all existing screenshot directories.
    pub fn start(&mut self, config: &AppConfig, db: Arc<Database>) -> Result<()> {
        // Stop previous watcher if running
        self.stop();

        let matcher = ScreenshotMatcher::new(&config.patterns, &config.extensions);

        let mut debouncer = new_debouncer(
            Duration::from_secs(2), // let the screenshot tool finish writing
            move |events: std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match events {
                    Ok(events) => {
                        for event in events {
                            if event.kind == DebouncedEventKind::Any {
                                handle_file_event(&event.path, &matcher, &db);
                            }
                        }
                    }
                    Err(e) => log::warn!("Watch error: {}", e),
                }
            },
        )
        .map_err(|e| VaultError::Config(format!("Failed to create file watcher: {}", e)))?;

        for dir in &config.screenshot_dirs {
            if dir.exists() {
                debouncer
                    .watcher()
                    .watch(dir, RecursiveMode::NonRecursive)
                    .map_err(|e| VaultError::Config(format!("Failed to watch {}: {}", dir.display(), e)))?;
                log::info!("Watching: {}", dir.display());
            }
        }

        self.debouncer = Some(debouncer);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.debouncer.take().is_some() {
            log::info!("File watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.debouncer.is_some()
    }
}

/// Returns true when the event produced a newly tracked file.
pub(crate) fn handle_file_event(path: &Path, matcher: &ScreenshotMatcher, db: &Database) -> bool {
    // Deletions and directories also arrive as events.
    if !path.is_file() || !matcher.is_screenshot(path) {
        return false;
    }
    match track_file(db, path) {
        Ok(is_new) => {
            if is_new {
                log::info!("New screenshot: {}", path.display());
            }
            is_new
        }
        Err(e) => {
            log::warn!("Failed to track {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn events_track_matching_files_once() {
        let dir = tempdir().unwrap();
        let db = test_db();
        let matcher = ScreenshotMatcher::new(&["Screenshot*".to_string()], &["png".to_string()]);
        let shot = dir.path().join("Screenshot 1.png");
        let other = dir.path().join("cat.png");
        fs::write(&shot, b"a").unwrap();
        fs::write(&other, b"b").unwrap();

        assert!(handle_file_event(&shot, &matcher, &db));
        assert!(!handle_file_event(&shot, &matcher, &db));
        assert!(!handle_file_event(&other, &matcher, &db));
        assert!(!handle_file_event(&dir.path().join("Screenshot gone.png"), &matcher, &db));
        assert_eq!(db.get_all_files().unwrap().len(), 1);
    }

    #[test]
    fn start_and_stop() {
        let dir = tempdir().unwrap();
        let config = AppConfig::rooted_at(dir.path());
        fs::create_dir_all(&config.screenshot_dirs[0]).unwrap();
        let db = Arc::new(test_db());

        let mut watcher = FileWatcher::new();
        watcher.start(&config, db).unwrap();
        assert!(watcher.is_running());
        watcher.stop();
        assert!(!watcher.is_running());
    }
}
