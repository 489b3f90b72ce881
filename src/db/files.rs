use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::models::TrackedFile;
use super::{from_millis, to_millis, Database};
use crate::error::{Result, VaultError};

const FILE_COLUMNS: &str = "path, size, mtime, last_accessed";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedFile> {
    Ok(TrackedFile {
        path: row.get(0)?,
        size: row.get::<_, i64>(1)? as u64,
        modified: row.get::<_, Option<i64>>(2)?.map(from_millis),
        last_accessed: from_millis(row.get(3)?),
    })
}

impl Database {
    /// Insert or replace the row for `file.path`.
    pub fn add_file(&self, file: &TrackedFile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (path, size, mtime, last_accessed)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime = excluded.mtime,
                last_accessed = excluded.last_accessed",
            params![
                file.path,
                file.size as i64,
                file.modified.map(to_millis),
                to_millis(file.last_accessed)
            ],
        )
        .map_err(|e| VaultError::store(&file.path, e))?;
        Ok(())
    }

    /// Upsert from discovery: refreshes size/mtime but keeps an existing `last_accessed`.
    /// Returns true when the row is new.
    pub fn record_discovered_file(
        &self,
        path: &str,
        size: u64,
        modified: Option<DateTime<Utc>>,
        seen_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let existed: bool = conn
            .query_row("SELECT 1 FROM files WHERE path = ?1", params![path], |_| Ok(()))
            .optional()
            .map_err(|e| VaultError::store(path, e))?
            .is_some();
        conn.execute(
            "INSERT INTO files (path, size, mtime, last_accessed)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime = excluded.mtime",
            params![path, size as i64, modified.map(to_millis), to_millis(seen_at)],
        )
        .map_err(|e| VaultError::store(path, e))?;
        Ok(!existed)
    }

    pub fn get_file(&self, path: &str) -> Result<Option<TrackedFile>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM files WHERE path = ?1", FILE_COLUMNS),
            params![path],
            file_from_row,
        )
        .optional()
        .map_err(|e| VaultError::store(path, e))
    }

    /// Returns true if a row was removed.
    pub fn delete_file(&self, path: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM files WHERE path = ?1", params![path])
            .map_err(|e| VaultError::store(path, e))?;
        Ok(removed > 0)
    }

    /// Set `last_accessed` (now when `at` is None). Returns false if the path is untracked.
    pub fn update_file_access(&self, path: &str, at: Option<DateTime<Utc>>) -> Result<bool> {
        let at = at.unwrap_or_else(Utc::now);
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE files SET last_accessed = ?1 WHERE path = ?2",
                params![to_millis(at), path],
            )
            .map_err(|e| VaultError::store(path, e))?;
        Ok(updated > 0)
    }

    /// Tracked files last accessed strictly before `cutoff`, oldest first.
    pub fn get_files_by_date(&self, cutoff: DateTime<Utc>) -> Result<Vec<TrackedFile>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM files WHERE last_accessed < ?1 ORDER BY last_accessed ASC",
                FILE_COLUMNS
            ))
            .map_err(|e| VaultError::store("files", e))?;
        let rows = stmt
            .query_map(params![to_millis(cutoff)], file_from_row)
            .map_err(|e| VaultError::store("files", e))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| VaultError::store("files", e))?);
        }
        Ok(entries)
    }

    /// All tracked files, most recently accessed first.
    pub fn get_all_files(&self) -> Result<Vec<TrackedFile>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM files ORDER BY last_accessed DESC, path ASC",
                FILE_COLUMNS
            ))
            .map_err(|e| VaultError::store("files", e))?;
        let rows = stmt
            .query_map([], file_from_row)
            .map_err(|e| VaultError::store("files", e))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| VaultError::store("files", e))?);
        }
        Ok(entries)
    }
}
