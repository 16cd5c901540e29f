//! Orchestration over metadata rows and blob payloads.

use anyhow::{Context, Result, anyhow};
use sqlx::PgPool;
use tracing::warn;

use crate::blob::{BlobBackend, BlobObject, BlobStore};
use crate::db::is_unique_violation;

use super::models::{Directory, DirectoryListing, File};
use super::policy;
use super::repo::TreeRepo;

#[derive(Debug)]
pub enum CreateDirectoryOutcome {
    Created(Directory),
    Conflict,
}

#[derive(Debug)]
pub enum UploadOutcome {
    /// Neither the content type nor the file name yields an extension.
    NoExtension,
    Stored(File),
}

pub struct TreeService {
    pool: PgPool,
    blobs: BlobBackend,
}

impl TreeService {
    #[must_use]
    pub fn new(pool: PgPool, blobs: BlobBackend) -> Self {
        Self { pool, blobs }
    }

    /// One level of the tree: the directory plus its immediate
    /// subdirectories and files (not recursive).
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn directory_listing(&self, id: i64) -> Result<Option<DirectoryListing>> {
        let Some(directory) = TreeRepo::get_directory(&self.pool, id).await? else {
            return Ok(None);
        };
        let subdirectories = TreeRepo::list_subdirectories(&self.pool, id).await?;
        let files = TreeRepo::list_files(&self.pool, id).await?;
        Ok(Some(DirectoryListing {
            directory,
            subdirectories,
            files,
        }))
    }

    /// Create a directory; duplicate sibling names (same parent, name,
    /// owner) are rejected. The pre-check keeps the common path clean, the
    /// unique constraint settles races.
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn create_directory(
        &self,
        parent_id: i64,
        name: &str,
        username: &str,
    ) -> Result<CreateDirectoryOutcome> {
        if TreeRepo::directory_exists(&self.pool, parent_id, name, username).await? {
            return Ok(CreateDirectoryOutcome::Conflict);
        }
        match TreeRepo::insert_directory(&self.pool, Some(parent_id), name, username).await {
            Ok(directory) => Ok(CreateDirectoryOutcome::Created(directory)),
            Err(err) if is_unique_violation(&err) => Ok(CreateDirectoryOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert directory"),
        }
    }

    /// Cascading, depth-capped delete of directory metadata.
    ///
    /// Returns the number of rows removed, or `None` when the root does not
    /// resolve. Descendants past [`policy::MAX_DELETE_DEPTH`] levels stay
    /// behind as orphans, file rows in the subtree are untouched, and blob
    /// payloads are never purged here.
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn delete_directory(&self, id: i64) -> Result<Option<u64>> {
        let Some(root) = TreeRepo::get_directory(&self.pool, id).await? else {
            return Ok(None);
        };
        let edges = TreeRepo::list_directories_for_user(&self.pool, &root.username).await?;
        let ids = policy::deletion_set(root.id, &edges);
        let removed = TreeRepo::delete_directories(&self.pool, &ids).await?;
        Ok(Some(removed))
    }

    /// Store a file: resolve duplicates, insert the metadata row, derive
    /// the blob key from the generated id, persist the key, then write the
    /// payload.
    ///
    /// The three store interactions are sequential with no compensating
    /// transaction; a crash in between leaves a row with a NULL blob key,
    /// which the duplicate cleanup reaps on a later attempt. If the final
    /// re-fetch fails the operation reports an error even though the row
    /// and blob were already written.
    ///
    /// # Errors
    /// Returns an error if a database query or the blob write fails.
    pub async fn upload_file(
        &self,
        directory_id: i64,
        username: &str,
        name: &str,
        content_type: &str,
        payload: Vec<u8>,
    ) -> Result<UploadOutcome> {
        let Some(extension) = policy::file_extension(name, content_type) else {
            return Ok(UploadOutcome::NoExtension);
        };

        let duplicates =
            TreeRepo::find_file_duplicates(&self.pool, directory_id, name, content_type).await?;
        let resolution = policy::resolve_duplicates(name, &duplicates);
        if !resolution.stale_ids.is_empty() {
            TreeRepo::delete_files(&self.pool, &resolution.stale_ids).await?;
        }

        let id = TreeRepo::insert_file(
            &self.pool,
            directory_id,
            username,
            &resolution.final_name,
            content_type,
        )
        .await?;
        let blob_key = format!("file-{id}.{extension}");
        TreeRepo::set_file_blob_key(&self.pool, id, &blob_key).await?;
        self.blobs.put(&blob_key, content_type, payload).await?;

        let Some(stored) = TreeRepo::get_file(&self.pool, id).await? else {
            return Err(anyhow!("file row {id} missing after upload"));
        };
        Ok(UploadOutcome::Stored(stored))
    }

    /// Fetch a payload by blob key; `None` when the object or its content
    /// type is missing. Placeholder requests never reach this point, the
    /// handler answers them first.
    ///
    /// # Errors
    /// Returns an error if the blob store fails.
    pub async fn download_file(&self, blob_key: &str) -> Result<Option<BlobObject>> {
        let Some(object) = self.blobs.get(blob_key).await? else {
            return Ok(None);
        };
        if object.content_type.is_none() {
            return Ok(None);
        }
        Ok(Some(object))
    }

    /// Delete a file: remove the metadata row, return its pre-deletion
    /// snapshot, then delete the blob best-effort. A failed blob delete is
    /// logged, never rolled back.
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn delete_file(&self, id: i64, blob_key: &str) -> Result<Option<File>> {
        let Some(snapshot) = TreeRepo::get_file(&self.pool, id).await? else {
            return Ok(None);
        };
        TreeRepo::delete_file_row(&self.pool, id).await?;
        if let Err(err) = self.blobs.delete(blob_key).await {
            warn!("blob delete failed for {blob_key}: {err:#}");
        }
        Ok(Some(snapshot))
    }
}
