//! Screenshot index with cache copies, recoverable deletions and
//! retention-driven cleanup, backed by SQLite.
//!
//! Start from [`commands::AppState`]: it wires the store, the cache, the
//! backup manager and the cleanup scheduler from one [`config::AppConfig`].
//! One process per data directory is assumed; two invocations against the
//! same directory at once are not coordinated.

pub mod backup;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod pattern;
pub mod scheduler;
pub mod watcher;

pub use commands::AppState;
pub use error::{Result, VaultError};

/// Set up `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
/// Calling it again is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}
