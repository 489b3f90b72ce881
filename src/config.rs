use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};

const APP_DIR_NAME: &str = "shotvault";

/// Get the app data directory: <config dir>/shotvault/
/// Does not touch the filesystem; see `AppConfig::ensure_ready`.
pub fn app_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn config_path() -> PathBuf {
    app_data_dir().join("config.json")
}

// ── Data types ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directories scanned for screenshots
    #[serde(default = "default_screenshot_dirs")]
    pub screenshot_dirs: Vec<PathBuf>,
    /// Filename patterns that classify a file as a screenshot.
    /// Glob (`Screenshot*`) or regex wrapped in slashes (`/^scr_\d+/`).
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    /// Extensions (lowercase, no dot) considered at all
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Where the SQLite database lives
    #[serde(default = "app_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(default)]
    pub settings: RetentionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Maximum size of the cache directory in MB (0 = unlimited)
    #[serde(default = "default_max_cache_size_mb")]
    pub max_cache_size_mb: u64,
    /// Days since last access before a cache entry expires
    #[serde(default = "default_cache_expiration_days")]
    pub cache_expiration_days: u32,
    /// Days a backup is kept once it falls outside `max_backups`
    #[serde(default = "default_max_backup_age_days")]
    pub max_backup_age_days: u32,
    /// Number of most recent backups that are never purged
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// Hours between time-gated cleanups
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u32,
}

fn default_screenshot_dirs() -> Vec<PathBuf> {
    let mut dirs_found = Vec::new();
    if let Some(pictures) = dirs::picture_dir() {
        dirs_found.push(pictures.join("Screenshots"));
    }
    if let Some(desktop) = dirs::desktop_dir() {
        dirs_found.push(desktop);
    }
    dirs_found
}

fn default_patterns() -> Vec<String> {
    [
        "Screenshot*",
        "Screen Shot*",
        "*screenshot*",
        "Capture*",
        r"/^scr_\d+/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "webp", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(app_data_dir)
        .join(APP_DIR_NAME)
}

fn default_backup_dir() -> PathBuf {
    app_data_dir().join("backups")
}

fn default_max_cache_size_mb() -> u64 {
    500
}

fn default_cache_expiration_days() -> u32 {
    7
}

fn default_max_backup_age_days() -> u32 {
    30
}

fn default_max_backups() -> usize {
    10
}

fn default_cleanup_interval_hours() -> u32 {
    24
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_cache_size_mb: default_max_cache_size_mb(),
            cache_expiration_days: default_cache_expiration_days(),
            max_backup_age_days: default_max_backup_age_days(),
            max_backups: default_max_backups(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

impl RetentionSettings {
    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache_expiration_days as i64)
    }

    pub fn backup_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_backup_age_days as i64)
    }

    pub fn cleanup_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cleanup_interval_hours as i64)
    }

    /// Byte limit for the cache directory, `None` when unlimited.
    pub fn max_cache_bytes(&self) -> Option<u64> {
        (self.max_cache_size_mb > 0).then(|| self.max_cache_size_mb * 1024 * 1024)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            screenshot_dirs: default_screenshot_dirs(),
            patterns: default_patterns(),
            extensions: default_extensions(),
            data_dir: app_data_dir(),
            cache_dir: default_cache_dir(),
            backup_dir: default_backup_dir(),
            settings: RetentionSettings::default(),
        }
    }
}

impl AppConfig {
    /// Config rooted at a single directory. Used by tests and portable installs.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            screenshot_dirs: vec![root.join("screenshots")],
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
            backup_dir: root.join("backups"),
            ..Self::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("shotvault.db")
    }

    /// Create the data, cache and backup directories. Safe to call repeatedly.
    pub fn ensure_ready(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.cache_dir, &self.backup_dir] {
            fs::create_dir_all(dir).map_err(|e| VaultError::io(dir, e))?;
        }
        Ok(())
    }
}

// ── Load / Save ─────────────────────────────────────────────

/// Read a file to string, handling BOM (UTF-8 BOM and UTF-16 LE/BE).
pub fn read_file_strip_bom(path: &Path) -> Result<String> {
    let raw = fs::read(path).map_err(|e| VaultError::io(path, e))?;

    // UTF-16 LE BOM: FF FE
    if raw.len() >= 2 && raw[0] == 0xFF && raw[1] == 0xFE {
        let u16_iter = raw[2..].chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]));
        return String::from_utf16(&u16_iter.collect::<Vec<u16>>())
            .map_err(|e| VaultError::Config(format!("Invalid UTF-16 LE: {}", e)));
    }

    // UTF-16 BE BOM: FE FF
    if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
        let u16_iter = raw[2..].chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
        return String::from_utf16(&u16_iter.collect::<Vec<u16>>())
            .map_err(|e| VaultError::Config(format!("Invalid UTF-16 BE: {}", e)));
    }

    // UTF-8 BOM: EF BB BF
    let text = String::from_utf8(raw).map_err(|e| VaultError::Config(format!("Invalid UTF-8: {}", e)))?;
    Ok(text.strip_prefix('\u{FEFF}').unwrap_or(&text).to_string())
}

/// Strict load: any read or parse problem is an error.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let data = read_file_strip_bom(path)?;
    serde_json::from_str(&data)
        .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))
}

/// Load the user config, falling back to defaults (and writing them) when absent or broken.
pub fn load_config() -> AppConfig {
    let path = config_path();
    if path.exists() {
        match load_config_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Using default config: {}", e);
                AppConfig::default()
            }
        }
    } else {
        let config = AppConfig::default();
        if let Err(e) = save_config_to(&config, &path) {
            log::debug!("Could not write default config: {}", e);
        }
        config
    }
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(config).map_err(|e| VaultError::Config(e.to_string()))?;
    fs::write(path, json).map_err(|e| VaultError::io(path, e))?;
    Ok(())
}
