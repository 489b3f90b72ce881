use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::models::DeletedFile;
use super::{from_millis, to_millis, Database};
use crate::error::{Result, VaultError};

fn deleted_from_row(row: &Row<'_>) -> rusqlite::Result<DeletedFile> {
    Ok(DeletedFile {
        path: row.get(0)?,
        deleted_at: from_millis(row.get(1)?),
        backup_path: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
    })
}

impl Database {
    /// Record (or replace) the deletion marker for `path`.
    pub fn add_deleted_file(
        &self,
        path: &str,
        backup_path: &str,
        size: u64,
        deleted_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO deleted_files (path, deleted_at, backup_path, size)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                deleted_at = excluded.deleted_at,
                backup_path = excluded.backup_path,
                size = excluded.size",
            params![path, to_millis(deleted_at), backup_path, size as i64],
        )
        .map_err(|e| VaultError::store(path, e))?;
        Ok(())
    }

    pub fn get_deleted_file(&self, path: &str) -> Result<Option<DeletedFile>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT path, deleted_at, backup_path, size FROM deleted_files WHERE path = ?1",
            params![path],
            deleted_from_row,
        )
        .optional()
        .map_err(|e| VaultError::store(path, e))
    }

    /// Most recent deletions first.
    pub fn get_recently_deleted(&self, limit: usize) -> Result<Vec<DeletedFile>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT path, deleted_at, backup_path, size
                 FROM deleted_files ORDER BY deleted_at DESC, path ASC LIMIT ?1",
            )
            .map_err(|e| VaultError::store("deleted_files", e))?;
        let rows = stmt
            .query_map(params![limit as i64], deleted_from_row)
            .map_err(|e| VaultError::store("deleted_files", e))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| VaultError::store("deleted_files", e))?);
        }
        Ok(entries)
    }

    pub fn remove_from_deleted_files(&self, path: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM deleted_files WHERE path = ?1", params![path])
            .map_err(|e| VaultError::store(path, e))?;
        Ok(removed > 0)
    }

    /// Drop markers pointing at a backup file that no longer exists.
    pub fn remove_deleted_by_backup_path(&self, backup_path: &str) -> Result<usize> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM deleted_files WHERE backup_path = ?1",
            params![backup_path],
        )
        .map_err(|e| VaultError::store(backup_path, e))
    }
}
