//! Pure decisions for tree mutation: deletion sets, duplicate-name
//! resolution, extension derivation, and the placeholder download contract.

use std::collections::{HashMap, VecDeque};

use super::models::{Directory, File};

/// How many levels a cascading delete descends; anything deeper is left
/// behind as orphaned rows rather than erroring. Known limitation kept as a
/// safety bound against pathological trees.
pub const MAX_DELETE_DEPTH: usize = 10;

/// Content type treated as "no information"; the extension then comes from
/// the file name instead.
pub(crate) const GENERIC_CONTENT_TYPE: &str = "text/plain";

const PLACEHOLDER_FILE_ID: i64 = -1;
const PLACEHOLDER_BLOB_KEY: &str = "dummyData";

/// Client-side placeholder rows short-circuit downloads with a stub
/// success instead of hitting the blob store.
#[must_use]
pub fn is_placeholder_request(file_id: i64, blob_key: &str) -> bool {
    file_id == PLACEHOLDER_FILE_ID || blob_key == PLACEHOLDER_BLOB_KEY
}

/// Extension for the blob key, from the content type or (for the generic
/// content type) from the file name. `None` means the upload is rejected.
#[must_use]
pub fn file_extension(name: &str, content_type: &str) -> Option<String> {
    let extension = if content_type == GENERIC_CONTENT_TYPE {
        name.rsplit('.').next().unwrap_or_default()
    } else {
        content_type.rsplit('/').next().unwrap_or_default()
    };
    if extension.is_empty() {
        None
    } else {
        Some(extension.to_string())
    }
}

/// Directory ids to remove for a cascading delete rooted at `root_id`,
/// breadth-first over the owner's edge list, capped at [`MAX_DELETE_DEPTH`]
/// levels (the root is level 0).
///
/// Termination holds even on corrupt, cyclic parent links: every queue
/// entry carries its depth and nothing at the cap is expanded.
#[must_use]
pub fn deletion_set(root_id: i64, directories: &[Directory]) -> Vec<i64> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for directory in directories {
        if let Some(parent_id) = directory.parent_id {
            children.entry(parent_id).or_default().push(directory.id);
        }
    }

    let mut ids = Vec::new();
    let mut queue = VecDeque::from([(root_id, 0usize)]);
    while let Some((id, depth)) = queue.pop_front() {
        if depth >= MAX_DELETE_DEPTH {
            continue;
        }
        ids.push(id);
        if let Some(kids) = children.get(&id) {
            for &child in kids {
                queue.push_back((child, depth + 1));
            }
        }
    }
    ids
}

/// Result of resolving duplicate (directory, name, content type) rows
/// before an upload.
#[derive(Debug, PartialEq, Eq)]
pub struct DuplicateResolution {
    /// Rows from earlier uploads that never received a blob key; reaped
    /// outright before the new row is inserted.
    pub stale_ids: Vec<i64>,
    /// Display name for the new row, suffixed with `(<count>)` when
    /// completed duplicates remain.
    pub final_name: String,
}

#[must_use]
pub fn resolve_duplicates(name: &str, existing: &[File]) -> DuplicateResolution {
    let stale_ids: Vec<i64> = existing
        .iter()
        .filter(|file| file.blob_key.is_none())
        .map(|file| file.id)
        .collect();
    let remaining = existing.len() - stale_ids.len();
    let final_name = if remaining > 0 {
        format!("{name}({remaining})")
    } else {
        name.to_string()
    };
    DuplicateResolution {
        stale_ids,
        final_name,
    }
}
