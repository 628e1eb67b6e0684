//! Snapshot blob storage.
//!
//! The retention engine only needs list/delete/upload/download, so it talks
//! to a small [`SnapshotStore`] trait. [`ObjectStoreSnapshots`] backs it with
//! any `object_store` implementation selected by DSN.

use crate::error::{BackupError, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
    PutPayload,
};
use std::sync::Arc;
use url::Url;

/// One entry from a store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Operations the backup subsystem needs from the blob store.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// List every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError>;

    /// Delete `key`. A missing key reports [`StoreError::NotFound`].
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Write `bytes` to `key`, replacing any existing object.
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Read the full object at `key`.
    async fn download(&self, key: &str) -> Result<Bytes, StoreError>;
}

/// [`SnapshotStore`] over an `object_store` backend.
#[derive(Clone)]
pub struct ObjectStoreSnapshots {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectStoreSnapshots {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Volatile store, used by tests and `memory://` DSNs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Open the store named by `dsn`.
    ///
    /// # Errors
    /// Returns [`BackupError::InvalidStorageDsn`] for malformed or unsupported DSNs.
    pub fn from_dsn(dsn: &str) -> Result<Self, BackupError> {
        create_object_store_from_dsn(dsn).map(Self::new)
    }
}

#[async_trait]
impl SnapshotStore for ObjectStoreSnapshots {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        let prefix = prefix.trim_matches('/');
        let prefix_path = (!prefix.is_empty()).then(|| Path::from(prefix));
        let metas: Vec<_> = self
            .inner
            .list(prefix_path.as_ref())
            .try_collect()
            .await?;
        Ok(metas
            .into_iter()
            .map(|meta| StoredObject {
                key: meta.location.to_string(),
                size: meta.size,
                last_modified: meta.last_modified,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = Path::from(key);
        // Some backends treat deletes of missing keys as success; probe first so
        // every backend reports absence the same way.
        self.inner.head(&path).await?;
        self.inner.delete(&path).await?;
        Ok(())
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.inner
            .put(&Path::from(key), PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes, StoreError> {
        let result = self.inner.get(&Path::from(key)).await?;
        Ok(result.bytes().await?)
    }
}

fn invalid_dsn(dsn: &str, reason: impl std::fmt::Display) -> BackupError {
    BackupError::InvalidStorageDsn(format!("'{}': {}", dsn, reason))
}

/// Create an object store from a DSN string.
///
/// Supported schemes: `file:///path`, `memory://`, and
/// `s3://[access_key:secret_key@]host[:port]/bucket`.
///
/// # Errors
/// Returns [`BackupError::InvalidStorageDsn`] when the DSN cannot be parsed,
/// names an unsupported scheme, or the backend fails to initialise.
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>, BackupError> {
    let url = Url::parse(dsn).map_err(|err| invalid_dsn(dsn, err))?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(invalid_dsn(
                    dsn,
                    "file DSN must specify a path: file:///path/to/storage",
                ));
            }
            std::fs::create_dir_all(path).map_err(|err| invalid_dsn(dsn, err))?;
            let store = LocalFileSystem::new_with_prefix(path).map_err(|err| invalid_dsn(dsn, err))?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let store = s3_builder_from_url(dsn, &url)?
                .build()
                .map_err(|err| invalid_dsn(dsn, err))?;
            Ok(Arc::new(store))
        }
        scheme => Err(invalid_dsn(
            dsn,
            format!("unsupported scheme '{}'; expected file, memory, or s3", scheme),
        )),
    }
}

fn s3_builder_from_url(dsn: &str, url: &Url) -> Result<AmazonS3Builder, BackupError> {
    let host = url
        .host_str()
        .ok_or_else(|| invalid_dsn(dsn, "missing S3 host"))?;
    let bucket = url.path().trim_start_matches('/');
    if bucket.is_empty() {
        return Err(invalid_dsn(dsn, "S3 DSN must specify a bucket: s3://host/bucket"));
    }

    let region = url
        .query_pairs()
        .find(|(key, _)| key == "region")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| "us-east-1".to_string());

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(region);

    if !url.username().is_empty() {
        builder = builder
            .with_access_key_id(url.username())
            .with_secret_access_key(url.password().unwrap_or(""));
    }

    // MinIO and other S3-compatible hosts need an explicit endpoint.
    if !host.ends_with("amazonaws.com") {
        let port = url.port();
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(scheme == "http")
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}
