use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::models::Setting;
use super::{from_millis, to_millis, Database};
use crate::error::{Result, VaultError};

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_setting_entry(key)?.map(|s| s.value))
    }

    pub fn get_setting_entry(&self, key: &str) -> Result<Option<Setting>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT key, value, updated_at FROM settings WHERE key = ?1",
            params![key],
            |row| {
                Ok(Setting {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: from_millis(row.get(2)?),
                })
            },
        )
        .optional()
        .map_err(|e| VaultError::store(key, e))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, to_millis(Utc::now())],
        )
        .map_err(|e| VaultError::store(key, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_db;

    #[test]
    fn settings_upsert() {
        let db = test_db();
        assert!(db.get_setting("theme").unwrap().is_none());
        db.set_setting("theme", "dark").unwrap();
        db.set_setting("theme", "light").unwrap();
        let entry = db.get_setting_entry("theme").unwrap().unwrap();
        assert_eq!(entry.value, "light");
        assert_eq!(entry.key, "theme");
    }
}
