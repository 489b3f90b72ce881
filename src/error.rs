use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The store was used before `Database::init` ran.
    #[error("database not initialized")]
    NotInitialized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Persistence failure. `key` is the path, setting key or table being touched.
    #[error("store error for {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

impl VaultError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn store(key: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Store {
            key: key.into(),
            source,
        }
    }

    /// True when the underlying cause is a missing file.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
