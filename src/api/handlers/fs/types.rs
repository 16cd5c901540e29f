//! Request/response types for directory and file endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::models::{Directory, DirectoryListing, File};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub username: String,
    pub date_created: DateTime<Utc>,
}

impl From<Directory> for DirectoryRecord {
    fn from(directory: Directory) -> Self {
        Self {
            id: directory.id,
            parent_id: directory.parent_id,
            name: directory.name,
            username: directory.username,
            date_created: directory.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    pub directory_id: i64,
    pub username: String,
    pub name: String,
    pub content_type: String,
    pub blob_key: Option<String>,
    pub date_created: DateTime<Utc>,
}

impl From<File> for FileRecord {
    fn from(file: File) -> Self {
        Self {
            id: file.id,
            directory_id: file.directory_id,
            username: file.username,
            name: file.name,
            content_type: file.content_type,
            blob_key: file.blob_key,
            date_created: file.created_at,
        }
    }
}

/// A directory plus its immediate children (one level, not recursive).
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListingResponse {
    pub id: i64,
    pub name: String,
    pub subdirectories: Vec<DirectoryRecord>,
    pub files: Vec<FileRecord>,
}

impl From<DirectoryListing> for DirectoryListingResponse {
    fn from(listing: DirectoryListing) -> Self {
        Self {
            id: listing.directory.id,
            name: listing.directory.name,
            subdirectories: listing
                .subdirectories
                .into_iter()
                .map(DirectoryRecord::from)
                .collect(),
            files: listing.files.into_iter().map(FileRecord::from).collect(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EntryDirectoryResponse {
    pub entry_directory_id: i64,
    pub success_message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub username: String,
    pub window_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryQuery {
    pub username: String,
    pub window_id: String,
    pub directory_id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectoryRequest {
    pub username: String,
    pub window_id: String,
    pub directory_name: String,
    pub parent_directory_id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDirectoryRequest {
    pub username: String,
    pub window_id: String,
    pub directory_id: i64,
}

/// Metadata part of the multipart upload (`data` field, JSON).
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub username: String,
    pub window_id: String,
    pub file_name: String,
    pub directory_id: i64,
    /// Defaults to `text/plain` when absent, which routes extension
    /// derivation through the file name.
    pub content_type: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileQuery {
    pub username: String,
    pub window_id: String,
    pub file_id: i64,
    pub file_name: String,
    pub blob_key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileRequest {
    pub username: String,
    pub window_id: String,
    pub file_id: i64,
    pub blob_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeZone;

    #[test]
    fn directory_record_uses_wire_names() -> Result<()> {
        let record = DirectoryRecord::from(Directory {
            id: 3,
            parent_id: Some(1),
            name: "reports".to_string(),
            username: "alice@example.com".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        });
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["parentId"], 1);
        assert!(value["dateCreated"].is_string());
        Ok(())
    }

    #[test]
    fn upload_metadata_defaults_content_type_to_none() -> Result<()> {
        let metadata: UploadMetadata = serde_json::from_value(serde_json::json!({
            "username": "alice@example.com",
            "windowId": "window-1",
            "fileName": "notes.txt",
            "directoryId": 4,
        }))?;
        assert!(metadata.content_type.is_none());
        Ok(())
    }
}
