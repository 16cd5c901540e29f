//! File endpoints: multipart upload, download, delete.

use axum::{
    Json,
    extract::{Extension, Multipart, Query},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use super::types::{DeleteFileRequest, FileQuery, FileRecord, UploadMetadata};
use crate::api::error::ApiError;
use crate::api::handlers::{AccessGuard, Ack, ErrorBody, require_fields};
use crate::store::TreeService;
use crate::store::policy::{GENERIC_CONTENT_TYPE, is_placeholder_request};
use crate::store::service::UploadOutcome;

const METADATA_FIELD: &str = "data";
const PAYLOAD_FIELD: &str = "file";

/// Store a file. The multipart body carries a `data` field (JSON metadata)
/// and a `file` field (payload bytes).
#[utoipa::path(
    post,
    path = "/v1/fs/file",
    request_body(content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = FileRecord),
        (status = 400, description = "Missing parts or no extension", body = ErrorBody),
        (status = 401, description = "Invalid session", body = ErrorBody)
    ),
    tag = "fs"
)]
pub async fn upload_file(
    guard: Extension<Arc<AccessGuard>>,
    tree: Extension<Arc<TreeService>>,
    mut multipart: Multipart,
) -> Result<Json<FileRecord>, ApiError> {
    let mut metadata: Option<UploadMetadata> = None;
    let mut payload: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("could not decode request data".to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(METADATA_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::Validation("could not decode request data".to_string()))?;
                metadata = Some(serde_json::from_str(&text).map_err(|_| {
                    ApiError::Validation("could not decode request data".to_string())
                })?);
            }
            Some(PAYLOAD_FIELD) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::Validation("could not decode request data".to_string()))?;
                payload = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let Some(metadata) = metadata else {
        return Err(ApiError::Validation("missing metadata part".to_string()));
    };
    let Some(payload) = payload else {
        return Err(ApiError::Validation("missing file part".to_string()));
    };
    require_fields(&[
        ("username", &metadata.username),
        ("windowId", &metadata.window_id),
        ("fileName", &metadata.file_name),
    ])?;
    guard
        .require_session(&metadata.username, &metadata.window_id)
        .await?;

    let content_type = metadata
        .content_type
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| GENERIC_CONTENT_TYPE.to_string());

    match tree
        .upload_file(
            metadata.directory_id,
            &metadata.username,
            &metadata.file_name,
            &content_type,
            payload,
        )
        .await?
    {
        UploadOutcome::Stored(file) => {
            info!(file_id = file.id, "file stored");
            Ok(Json(FileRecord::from(file)))
        }
        UploadOutcome::NoExtension => {
            Err(ApiError::Validation("no file extension".to_string()))
        }
    }
}

/// Fetch a file payload by blob key.
///
/// Placeholder rows (id `-1` or the sentinel blob key) answer with a stub
/// success before session validation; that contract belongs to clients
/// that render empty listings.
#[utoipa::path(
    get,
    path = "/v1/fs/file",
    params(
        ("username" = String, Query, description = "Owner"),
        ("windowId" = String, Query, description = "Client window id"),
        ("fileId" = i64, Query, description = "File id, -1 for placeholders"),
        ("fileName" = String, Query, description = "Download name"),
        ("blobKey" = String, Query, description = "Payload key in the blob store")
    ),
    responses(
        (status = 200, description = "Raw payload bytes"),
        (status = 401, description = "Invalid session", body = ErrorBody),
        (status = 404, description = "Payload or content type missing", body = ErrorBody)
    ),
    tag = "fs"
)]
pub async fn get_file(
    guard: Extension<Arc<AccessGuard>>,
    tree: Extension<Arc<TreeService>>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    require_fields(&[
        ("username", &query.username),
        ("windowId", &query.window_id),
        ("fileName", &query.file_name),
        ("blobKey", &query.blob_key),
    ])?;

    if is_placeholder_request(query.file_id, &query.blob_key) {
        return Ok(Json(Ack::new("dummy")).into_response());
    }

    guard.require_session(&query.username, &query.window_id).await?;

    let Some(object) = tree.download_file(&query.blob_key).await? else {
        return Err(ApiError::NotFound("incomplete file".to_string()));
    };
    let content_type = object
        .content_type
        .unwrap_or_else(|| GENERIC_CONTENT_TYPE.to_string());
    let disposition = format!("inline; filename=\"{}\"", query.file_name.replace('"', ""));
    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CONTENT_DISPOSITION, disposition),
        ],
        object.bytes,
    )
        .into_response())
}

/// Delete a file row and its payload; the pre-deletion snapshot is the
/// response body.
#[utoipa::path(
    post,
    path = "/v1/fs/file/delete",
    request_body = DeleteFileRequest,
    responses(
        (status = 200, description = "Deleted file record", body = FileRecord),
        (status = 401, description = "Invalid session", body = ErrorBody),
        (status = 404, description = "No file found", body = ErrorBody)
    ),
    tag = "fs"
)]
pub async fn delete_file(
    guard: Extension<Arc<AccessGuard>>,
    tree: Extension<Arc<TreeService>>,
    payload: Option<Json<DeleteFileRequest>>,
) -> Result<Json<FileRecord>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[
        ("username", &request.username),
        ("windowId", &request.window_id),
        ("blobKey", &request.blob_key),
    ])?;
    guard
        .require_session(&request.username, &request.window_id)
        .await?;

    let Some(snapshot) = tree.delete_file(request.file_id, &request.blob_key).await? else {
        return Err(ApiError::NotFound("no file found".to_string()));
    };
    info!(file_id = request.file_id, "file deleted");
    Ok(Json(FileRecord::from(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobBackend;
    use crate::session::{PgSessionStore, SessionGate, SessionPolicy};
    use anyhow::Result;
    use axum::http::StatusCode;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    fn guard(pool: &PgPool) -> Arc<AccessGuard> {
        let gate = SessionGate::new(PgSessionStore::new(pool.clone()), SessionPolicy::new());
        Arc::new(AccessGuard::new(gate, false))
    }

    fn tree(pool: &PgPool) -> Arc<TreeService> {
        Arc::new(TreeService::new(pool.clone(), BlobBackend::memory()))
    }

    #[tokio::test]
    async fn placeholder_download_short_circuits() -> Result<()> {
        let pool = lazy_pool()?;
        // No session exists; the placeholder contract must still answer
        // with a stub success before validation runs.
        let response = get_file(
            Extension(guard(&pool)),
            Extension(tree(&pool)),
            Query(FileQuery {
                username: "alice@example.com".to_string(),
                window_id: "window-1".to_string(),
                file_id: -1,
                file_name: "placeholder.txt".to_string(),
                blob_key: "dummyData".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn get_file_blank_blob_key() -> Result<()> {
        let pool = lazy_pool()?;
        let result = get_file(
            Extension(guard(&pool)),
            Extension(tree(&pool)),
            Query(FileQuery {
                username: "alice@example.com".to_string(),
                window_id: "window-1".to_string(),
                file_id: 3,
                file_name: "notes.txt".to_string(),
                blob_key: String::new(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn delete_file_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = delete_file(Extension(guard(&pool)), Extension(tree(&pool)), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
