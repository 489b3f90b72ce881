use super::models::{DbStats, TableStats};
use super::Database;
use crate::error::{Result, VaultError};

const TABLES: [&str; 4] = ["files", "backups", "deleted_files", "settings"];

impl Database {
    /// Get the on-disk size of the database file in bytes (0 for in-memory stores).
    pub fn get_db_file_size(&self) -> u64 {
        self.path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Get row counts for all tables.
    pub fn get_table_stats(&self) -> Result<Vec<TableStats>> {
        let conn = self.conn()?;
        let mut stats = Vec::new();
        for table in &TABLES {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .map_err(|e| VaultError::store(*table, e))?;
            stats.push(TableStats {
                table_name: table.to_string(),
                row_count: count as u64,
            });
        }
        Ok(stats)
    }

    pub fn get_stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            tables: self.get_table_stats()?,
            db_size_bytes: self.get_db_file_size(),
        })
    }

    /// Reclaim space. Holds the connection lock for the whole run, so no other
    /// writer in this process interleaves with it.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("VACUUM")
            .map_err(|e| VaultError::store("vacuum", e))?;
        if self.path().is_some() {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .map_err(|e| VaultError::store("wal_checkpoint", e))?;
        }
        Ok(())
    }
}
