//! SQL for the directory/file store.

use anyhow::{Context, Result};
use sqlx::PgPool;

use super::models::{Directory, File};

pub struct TreeRepo;

impl TreeRepo {
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_directory(pool: &PgPool, id: i64) -> Result<Option<Directory>> {
        sqlx::query_as::<_, Directory>("SELECT * FROM directories WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch directory")
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_subdirectories(pool: &PgPool, parent_id: i64) -> Result<Vec<Directory>> {
        sqlx::query_as::<_, Directory>(
            "SELECT * FROM directories WHERE parent_id = $1 ORDER BY id",
        )
        .bind(parent_id)
        .fetch_all(pool)
        .await
        .context("failed to list subdirectories")
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_files(pool: &PgPool, directory_id: i64) -> Result<Vec<File>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE directory_id = $1 ORDER BY id")
            .bind(directory_id)
            .fetch_all(pool)
            .await
            .context("failed to list files")
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn directory_exists(
        pool: &PgPool,
        parent_id: i64,
        name: &str,
        username: &str,
    ) -> Result<bool> {
        let row = sqlx::query(
            r"
            SELECT 1 AS present
            FROM directories
            WHERE parent_id = $1
              AND name = $2
              AND username = $3
            LIMIT 1
            ",
        )
        .bind(parent_id)
        .bind(name)
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("failed to check for duplicate directory")?;
        Ok(row.is_some())
    }

    /// Insert a directory row. Returns the raw sqlx error so callers can
    /// map unique violations to a conflict.
    pub async fn insert_directory(
        pool: &PgPool,
        parent_id: Option<i64>,
        name: &str,
        username: &str,
    ) -> Result<Directory, sqlx::Error> {
        sqlx::query_as::<_, Directory>(
            r"
            INSERT INTO directories (parent_id, name, username)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(parent_id)
        .bind(name)
        .bind(username)
        .fetch_one(pool)
        .await
    }

    /// All directories owned by a user; the edge list for deletion planning.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_directories_for_user(
        pool: &PgPool,
        username: &str,
    ) -> Result<Vec<Directory>> {
        sqlx::query_as::<_, Directory>(
            "SELECT * FROM directories WHERE username = $1 ORDER BY id",
        )
        .bind(username)
        .fetch_all(pool)
        .await
        .context("failed to list directories for user")
    }

    /// # Errors
    /// Returns an error if the database execution fails.
    pub async fn delete_directories(pool: &PgPool, ids: &[i64]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM directories WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await
            .context("failed to delete directories")?;
        Ok(result.rows_affected())
    }

    /// Rows that collide with an upload on (directory, name, content type).
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn find_file_duplicates(
        pool: &PgPool,
        directory_id: i64,
        name: &str,
        content_type: &str,
    ) -> Result<Vec<File>> {
        sqlx::query_as::<_, File>(
            r"
            SELECT *
            FROM files
            WHERE directory_id = $1
              AND name = $2
              AND content_type = $3
            ORDER BY id
            ",
        )
        .bind(directory_id)
        .bind(name)
        .bind(content_type)
        .fetch_all(pool)
        .await
        .context("failed to query duplicate files")
    }

    /// # Errors
    /// Returns an error if the database execution fails.
    pub async fn delete_files(pool: &PgPool, ids: &[i64]) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await
            .context("failed to delete files")?;
        Ok(())
    }

    /// Insert the metadata row first; the generated id drives the blob key.
    ///
    /// # Errors
    /// Returns an error if the database insertion fails.
    pub async fn insert_file(
        pool: &PgPool,
        directory_id: i64,
        username: &str,
        name: &str,
        content_type: &str,
    ) -> Result<i64> {
        sqlx::query_scalar(
            r"
            INSERT INTO files (directory_id, username, name, content_type)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(directory_id)
        .bind(username)
        .bind(name)
        .bind(content_type)
        .fetch_one(pool)
        .await
        .context("failed to insert file row")
    }

    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn set_file_blob_key(pool: &PgPool, id: i64, blob_key: &str) -> Result<()> {
        sqlx::query("UPDATE files SET blob_key = $2 WHERE id = $1")
            .bind(id)
            .bind(blob_key)
            .execute(pool)
            .await
            .context("failed to set file blob key")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_file(pool: &PgPool, id: i64) -> Result<Option<File>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch file")
    }

    /// # Errors
    /// Returns an error if the database execution fails.
    pub async fn delete_file_row(pool: &PgPool, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete file row")?;
        Ok(())
    }
}
