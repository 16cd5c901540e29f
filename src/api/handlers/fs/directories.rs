//! Directory endpoints: entry lookup, listing, creation, cascading delete.

use axum::{
    Json,
    extract::{Extension, Query},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::types::{
    CreateDirectoryRequest, DeleteDirectoryRequest, DirectoryListingResponse, DirectoryQuery,
    DirectoryRecord, EntryDirectoryResponse, SessionQuery,
};
use crate::api::error::ApiError;
use crate::api::handlers::{AccessGuard, Ack, ErrorBody, auth::storage::get_user, require_fields};
use crate::store::TreeService;
use crate::store::service::CreateDirectoryOutcome;

/// Root directory id for the authenticated user.
#[utoipa::path(
    get,
    path = "/v1/fs/entry",
    params(
        ("username" = String, Query, description = "Owner"),
        ("windowId" = String, Query, description = "Client window id")
    ),
    responses(
        (status = 200, description = "Entry directory id", body = EntryDirectoryResponse),
        (status = 401, description = "Invalid session", body = ErrorBody),
        (status = 404, description = "No user or entry directory", body = ErrorBody)
    ),
    tag = "fs"
)]
pub async fn entry_directory(
    pool: Extension<PgPool>,
    guard: Extension<Arc<AccessGuard>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<EntryDirectoryResponse>, ApiError> {
    require_fields(&[("username", &query.username), ("windowId", &query.window_id)])?;
    guard.require_session(&query.username, &query.window_id).await?;

    let Some(user) = get_user(&pool, &query.username).await? else {
        return Err(ApiError::NotFound("no user found".to_string()));
    };
    Ok(Json(EntryDirectoryResponse {
        entry_directory_id: user.entry_directory_id,
        success_message: "entry found".to_string(),
    }))
}

/// One level of the tree: the directory plus its immediate children.
#[utoipa::path(
    get,
    path = "/v1/fs/directory",
    params(
        ("username" = String, Query, description = "Owner"),
        ("windowId" = String, Query, description = "Client window id"),
        ("directoryId" = i64, Query, description = "Directory to list")
    ),
    responses(
        (status = 200, description = "Directory with children", body = DirectoryListingResponse),
        (status = 401, description = "Invalid session", body = ErrorBody),
        (status = 404, description = "No directory found", body = ErrorBody)
    ),
    tag = "fs"
)]
pub async fn get_directory(
    guard: Extension<Arc<AccessGuard>>,
    tree: Extension<Arc<TreeService>>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<DirectoryListingResponse>, ApiError> {
    require_fields(&[("username", &query.username), ("windowId", &query.window_id)])?;
    guard.require_session(&query.username, &query.window_id).await?;

    let Some(listing) = tree.directory_listing(query.directory_id).await? else {
        return Err(ApiError::NotFound("no directory found".to_string()));
    };
    Ok(Json(DirectoryListingResponse::from(listing)))
}

#[utoipa::path(
    post,
    path = "/v1/fs/directory",
    request_body = CreateDirectoryRequest,
    responses(
        (status = 200, description = "Directory created", body = DirectoryRecord),
        (status = 401, description = "Invalid session", body = ErrorBody),
        (status = 409, description = "Directory already exists", body = ErrorBody)
    ),
    tag = "fs"
)]
pub async fn create_directory(
    guard: Extension<Arc<AccessGuard>>,
    tree: Extension<Arc<TreeService>>,
    payload: Option<Json<CreateDirectoryRequest>>,
) -> Result<Json<DirectoryRecord>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[
        ("username", &request.username),
        ("windowId", &request.window_id),
        ("directoryName", &request.directory_name),
    ])?;
    guard
        .require_session(&request.username, &request.window_id)
        .await?;

    match tree
        .create_directory(
            request.parent_directory_id,
            &request.directory_name,
            &request.username,
        )
        .await?
    {
        CreateDirectoryOutcome::Created(directory) => Ok(Json(DirectoryRecord::from(directory))),
        CreateDirectoryOutcome::Conflict => {
            Err(ApiError::Conflict("directory already exists".to_string()))
        }
    }
}

/// Cascading, depth-capped delete of a directory subtree.
#[utoipa::path(
    post,
    path = "/v1/fs/directory/delete",
    request_body = DeleteDirectoryRequest,
    responses(
        (status = 200, description = "Directory deleted", body = Ack),
        (status = 401, description = "Invalid session", body = ErrorBody),
        (status = 404, description = "No directory found", body = ErrorBody)
    ),
    tag = "fs"
)]
pub async fn delete_directory(
    guard: Extension<Arc<AccessGuard>>,
    tree: Extension<Arc<TreeService>>,
    payload: Option<Json<DeleteDirectoryRequest>>,
) -> Result<Json<Ack>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[
        ("username", &request.username),
        ("windowId", &request.window_id),
    ])?;
    guard
        .require_session(&request.username, &request.window_id)
        .await?;

    let Some(removed) = tree.delete_directory(request.directory_id).await? else {
        return Err(ApiError::NotFound("no directory found".to_string()));
    };
    info!(
        directory_id = request.directory_id,
        removed, "directory subtree deleted"
    );
    Ok(Json(Ack::new("directory deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobBackend;
    use crate::session::{PgSessionStore, SessionGate, SessionPolicy};
    use anyhow::Result;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
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
    async fn create_directory_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = create_directory(Extension(guard(&pool)), Extension(tree(&pool)), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn create_directory_blank_name() -> Result<()> {
        let pool = lazy_pool()?;
        let response = create_directory(
            Extension(guard(&pool)),
            Extension(tree(&pool)),
            Some(Json(CreateDirectoryRequest {
                username: "alice@example.com".to_string(),
                window_id: "window-1".to_string(),
                directory_name: "  ".to_string(),
                parent_directory_id: 1,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn delete_directory_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = delete_directory(Extension(guard(&pool)), Extension(tree(&pool)), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
