use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::models::BackupRecord;
use super::{from_millis, to_millis, Database};
use crate::error::{Result, VaultError};

fn backup_from_row(row: &Row<'_>) -> rusqlite::Result<BackupRecord> {
    Ok(BackupRecord {
        id: row.get(0)?,
        original_path: row.get(1)?,
        backup_path: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        size: row.get::<_, i64>(4)? as u64,
    })
}

impl Database {
    /// Record a backup copy. Returns the new row id.
    pub fn add_backup(
        &self,
        original_path: &str,
        backup_path: &str,
        size: u64,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO backups (original_path, backup_path, backup_time, size)
             VALUES (?1, ?2, ?3, ?4)",
            params![original_path, backup_path, to_millis(created_at), size as i64],
        )
        .map_err(|e| VaultError::store(original_path, e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Backups newest first, optionally only those of one origin path.
    /// An unknown path yields an empty list.
    pub fn get_backups(&self, original_path: Option<&str>) -> Result<Vec<BackupRecord>> {
        let conn = self.conn()?;
        let key = original_path.unwrap_or("backups");
        let mut entries = Vec::new();

        if let Some(path) = original_path {
            let mut stmt = conn
                .prepare(
                    "SELECT id, original_path, backup_path, backup_time, size
                     FROM backups WHERE original_path = ?1 ORDER BY backup_time DESC, id DESC",
                )
                .map_err(|e| VaultError::store(key, e))?;
            let rows = stmt
                .query_map(params![path], backup_from_row)
                .map_err(|e| VaultError::store(key, e))?;
            for row in rows {
                entries.push(row.map_err(|e| VaultError::store(key, e))?);
            }
        } else {
            let mut stmt = conn
                .prepare(
                    "SELECT id, original_path, backup_path, backup_time, size
                     FROM backups ORDER BY backup_time DESC, id DESC",
                )
                .map_err(|e| VaultError::store(key, e))?;
            let rows = stmt
                .query_map([], backup_from_row)
                .map_err(|e| VaultError::store(key, e))?;
            for row in rows {
                entries.push(row.map_err(|e| VaultError::store(key, e))?);
            }
        }

        Ok(entries)
    }

    /// Drop one row. Returns false if the id was unknown.
    pub fn remove_backup_by_id(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM backups WHERE id = ?1", params![id])
            .map_err(|e| VaultError::store(format!("backup #{}", id), e))?;
        Ok(removed > 0)
    }

    /// Returns the number of rows removed.
    pub fn remove_backup(&self, backup_path: &str) -> Result<usize> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM backups WHERE backup_path = ?1",
            params![backup_path],
        )
        .map_err(|e| VaultError::store(backup_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_db;
    use super::*;
    use chrono::Duration;

    #[test]
    fn backups_are_listed_newest_first() {
        let db = test_db();
        let now = Utc::now();
        db.add_backup("/a.png", "/b/1/a.png", 10, now - Duration::days(2)).unwrap();
        db.add_backup("/b.png", "/b/1/b.png", 20, now).unwrap();
        db.add_backup("/a.png", "/b/2/a.png", 11, now - Duration::days(1)).unwrap();

        let all = db.get_backups(None).unwrap();
        let paths: Vec<_> = all.iter().map(|b| b.backup_path.as_str()).collect();
        assert_eq!(paths, vec!["/b/1/b.png", "/b/2/a.png", "/b/1/a.png"]);

        let only_a = db.get_backups(Some("/a.png")).unwrap();
        assert_eq!(only_a.len(), 2);
        assert_eq!(only_a[0].backup_path, "/b/2/a.png");
    }

    #[test]
    fn unknown_origin_has_no_backups() {
        let db = test_db();
        assert!(db.get_backups(Some("/missing.png")).unwrap().is_empty());
    }

    #[test]
    fn remove_backup_by_backup_path() {
        let db = test_db();
        db.add_backup("/a.png", "/b/a.png", 10, Utc::now()).unwrap();
        db.add_backup("/c.png", "/b/c.png", 10, Utc::now()).unwrap();

        assert_eq!(db.remove_backup("/b/a.png").unwrap(), 1);
        assert_eq!(db.remove_backup("/b/a.png").unwrap(), 0);
        let left = db.get_backups(None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].backup_path, "/b/c.png");
    }

    #[test]
    fn remove_by_id_spares_rows_sharing_the_path() {
        let db = test_db();
        let first = db.add_backup("/a.png", "/b/a.png", 10, Utc::now()).unwrap();
        let second = db.add_backup("/a.png", "/b/a.png", 10, Utc::now()).unwrap();

        assert!(db.remove_backup_by_id(second).unwrap());
        assert!(!db.remove_backup_by_id(second).unwrap());
        let left = db.get_backups(Some("/a.png")).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, first);
    }
}
