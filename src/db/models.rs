use chrono::{DateTime, Utc};

/// An origin file known to the index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackedFile {
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
}

/// Point-in-time copy of a deleted origin file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackupRecord {
    pub id: i64,
    pub original_path: String,
    pub backup_path: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Most recent deletion of a path.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeletedFile {
    pub path: String,
    pub deleted_at: DateTime<Utc>,
    pub backup_path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TableStats {
    pub table_name: String,
    pub row_count: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DbStats {
    pub db_size_bytes: u64,
    pub tables: Vec<TableStats>,
}
