//! Payload storage behind a key/value blob interface.
//!
//! File bytes never live in Postgres; metadata rows carry a weak
//! back-reference (`files.blob_key`) to an object held here. The HTTP
//! backend talks to an S3-compatible gateway (`PUT`/`GET`/`DELETE` on
//! `{endpoint}/{bucket}/{key}` with bearer auth); the in-memory backend is
//! for local development and tests.

use anyhow::{Context, Result, anyhow};
use reqwest::{
    Client, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{Instrument, info, info_span};
use url::Url;

/// A stored payload plus the content type recorded when it was written.
///
/// The content type is optional: a gateway may answer without one, and
/// callers treat that the same as a missing object.
#[derive(Clone, Debug)]
pub struct BlobObject {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// Write a payload under `key`, replacing any previous object.
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()>;
    /// Fetch a payload; `Ok(None)` when the key does not resolve.
    async fn get(&self, key: &str) -> Result<Option<BlobObject>>;
    /// Delete a payload; deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory backend for local development and tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, BlobObject>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()> {
        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            BlobObject {
                content_type: Some(content_type.to_string()),
                bytes,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<BlobObject>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        objects.remove(key);
        Ok(())
    }
}

/// S3-compatible HTTP gateway backend.
pub struct HttpBlobStore {
    client: Client,
    endpoint: String,
    bucket: String,
    token: SecretString,
}

impl HttpBlobStore {
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL or the HTTP
    /// client cannot be built.
    pub fn new(endpoint: &str, bucket: &str, token: SecretString) -> Result<Self> {
        Url::parse(endpoint).with_context(|| format!("invalid blob endpoint: {endpoint}"))?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build blob store HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.object_url(key);
        let span = info_span!(
            "blob.put",
            http.method = "PUT",
            url = %url
        );
        let response = self
            .client
            .put(&url)
            .header(AUTHORIZATION, bearer(&self.token))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .instrument(span)
            .await
            .context("blob put request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("blob put failed: {}", response.status()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<BlobObject>> {
        let url = self.object_url(key);
        let span = info_span!(
            "blob.get",
            http.method = "GET",
            url = %url
        );
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, bearer(&self.token))
            .send()
            .instrument(span)
            .await
            .context("blob get request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("blob get failed: {}", response.status()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .context("failed to read blob payload")?;
        Ok(Some(BlobObject {
            content_type,
            bytes: bytes.to_vec(),
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.object_url(key);
        let span = info_span!(
            "blob.delete",
            http.method = "DELETE",
            url = %url
        );
        let response = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, bearer(&self.token))
            .send()
            .instrument(span)
            .await
            .context("blob delete request failed")?;

        // A missing object is already the desired end state.
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(anyhow!("blob delete failed: {}", response.status()));
        }
        Ok(())
    }
}

fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}

/// Runtime-selected blob backend.
pub enum BlobBackend {
    Memory(MemoryBlobStore),
    Http(HttpBlobStore),
}

impl BlobBackend {
    /// In-memory backend with a startup notice; used when no gateway is
    /// configured.
    #[must_use]
    pub fn memory() -> Self {
        info!("no blob gateway configured, payloads are stored in memory");
        Self::Memory(MemoryBlobStore::new())
    }
}

impl BlobStore for BlobBackend {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()> {
        match self {
            Self::Memory(store) => store.put(key, content_type, bytes).await,
            Self::Http(store) => store.put(key, content_type, bytes).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<BlobObject>> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Http(store) => store.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Self::Memory(store) => store.delete(key).await,
            Self::Http(store) => store.delete(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() -> Result<()> {
        let store = MemoryBlobStore::new();
        store
            .put("file-1.png", "image/png", vec![1, 2, 3])
            .await?;

        let object = store.get("file-1.png").await?.expect("object stored");
        assert_eq!(object.content_type.as_deref(), Some("image/png"));
        assert_eq!(object.bytes, vec![1, 2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_missing_key_is_none() -> Result<()> {
        let store = MemoryBlobStore::new();
        assert!(store.get("absent").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_delete_is_idempotent() -> Result<()> {
        let store = MemoryBlobStore::new();
        store.put("file-2.txt", "text/plain", vec![9]).await?;
        store.delete("file-2.txt").await?;
        store.delete("file-2.txt").await?;
        assert!(store.get("file-2.txt").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_put_replaces() -> Result<()> {
        let store = MemoryBlobStore::new();
        store.put("key", "text/plain", vec![1]).await?;
        store.put("key", "image/png", vec![2]).await?;
        let object = store.get("key").await?.expect("object stored");
        assert_eq!(object.content_type.as_deref(), Some("image/png"));
        assert_eq!(object.bytes, vec![2]);
        Ok(())
    }

    #[test]
    fn http_store_rejects_invalid_endpoint() {
        let result = HttpBlobStore::new("not a url", "bucket", SecretString::default());
        assert!(result.is_err());
    }

    #[test]
    fn http_store_builds_object_urls() -> Result<()> {
        let store = HttpBlobStore::new(
            "https://blobs.internal:9000/",
            "kesto",
            SecretString::default(),
        )?;
        assert_eq!(
            store.object_url("file-7.png"),
            "https://blobs.internal:9000/kesto/file-7.png"
        );
        Ok(())
    }
}
