//! Row types for the directory/file store.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row, postgres::PgRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub id: i64,
    /// NULL for each user's entry directory.
    pub parent_id: Option<i64>,
    pub name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Directory {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            parent_id: row.try_get("parent_id")?,
            name: row.try_get("name")?,
            username: row.try_get("username")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: i64,
    pub directory_id: i64,
    pub username: String,
    pub name: String,
    pub content_type: String,
    /// Key of the payload in the blob store; NULL until upload completes.
    pub blob_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for File {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            directory_id: row.try_get("directory_id")?,
            username: row.try_get("username")?,
            name: row.try_get("name")?,
            content_type: row.try_get("content_type")?,
            blob_key: row.try_get("blob_key")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// One level of the tree: a directory plus its immediate children.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    pub directory: Directory,
    pub subdirectories: Vec<Directory>,
    pub files: Vec<File>,
}
