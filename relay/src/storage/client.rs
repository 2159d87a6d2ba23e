//! Bucket-aware object storage client.
//!
//! One `object_store` handle is built per bucket the first time that bucket
//! is touched and cached for the lifetime of the process. The client is
//! cheap to clone and can be shared across request handlers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::{
    gcp::GoogleCloudStorageBuilder, local::LocalFileSystem, memory::InMemory, path::Path,
    Attribute, Attributes, ObjectStore, PutOptions, PutPayload,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::StorageBackend;

/// Object storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("bucket name must not be empty")]
    EmptyBucket,

    #[error("could not open bucket {bucket}: {source}")]
    Bucket {
        bucket: String,
        #[source]
        source: object_store::Error,
    },

    #[error("could not prepare local bucket directory {path}: {source}")]
    LocalDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object key {key:?} cannot be stored verbatim: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("could not read object {bucket}/{key}: {source}")]
    Read {
        bucket: String,
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("could not write object {bucket}/{key}: {source}")]
    Write {
        bucket: String,
        key: String,
        #[source]
        source: object_store::Error,
    },
}

/// Convert `key` into a store path that names exactly the same object.
///
/// Keys with empty, `.` or `..` segments, control characters, or a leading or
/// trailing `/` would be rewritten by the store and are rejected.
pub fn object_path(key: &str) -> Result<Path, StorageError> {
    let invalid = |reason: String| StorageError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("key is empty".to_string()));
    }

    let path = Path::parse(key).map_err(|e| invalid(e.to_string()))?;
    if path.as_ref() != key {
        return Err(invalid(format!("would be stored as {:?}", path.as_ref())));
    }

    Ok(path)
}

#[derive(Debug, Clone)]
enum Backend {
    Gcs,
    Local { root: PathBuf },
    Memory,
}

/// Get/put access to objects addressed by bucket and key.
#[derive(Clone)]
pub struct StorageClient {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    backend: Backend,
    buckets: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl StorageClient {
    /// Create a client for the configured backend.
    pub fn new(backend: &StorageBackend) -> Self {
        match backend {
            StorageBackend::Gcs => Self::with_backend(Backend::Gcs),
            StorageBackend::Local { root } => Self::with_backend(Backend::Local {
                root: PathBuf::from(root),
            }),
        }
    }

    /// Create a client whose buckets live in process memory.
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory)
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                backend,
                buckets: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Return the store backing `bucket`, opening it on first use.
    pub async fn bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::EmptyBucket);
        }

        {
            let buckets = self.inner.buckets.read().await;
            if let Some(store) = buckets.get(bucket) {
                return Ok(store.clone());
            }
        }

        let mut buckets = self.inner.buckets.write().await;

        // Double-check after acquiring write lock
        if let Some(store) = buckets.get(bucket) {
            return Ok(store.clone());
        }

        let store = self.open(bucket).await?;
        buckets.insert(bucket.to_string(), store.clone());

        info!(bucket = %bucket, backend = ?self.inner.backend, "storage_bucket_opened");

        Ok(store)
    }

    async fn open(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let store: Arc<dyn ObjectStore> = match &self.inner.backend {
            Backend::Gcs => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(|source| StorageError::Bucket {
                        bucket: bucket.to_string(),
                        source,
                    })?,
            ),
            Backend::Local { root } => {
                let dir = root.join(bucket);
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|source| StorageError::LocalDir {
                        path: dir.display().to_string(),
                        source,
                    })?;

                Arc::new(LocalFileSystem::new_with_prefix(&dir).map_err(|source| {
                    StorageError::Bucket {
                        bucket: bucket.to_string(),
                        source,
                    }
                })?)
            }
            Backend::Memory => Arc::new(InMemory::new()),
        };

        Ok(store)
    }

    /// Fetch the full contents of `bucket/key`.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let path = object_path(key)?;
        let store = self.bucket(bucket).await?;

        let read_err = |source: object_store::Error| match source {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            source => StorageError::Read {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            },
        };

        let object = store
            .get(&path)
            .await
            .map_err(read_err)?
            .bytes()
            .await
            .map_err(read_err)?;

        debug!(bucket = %bucket, key = %key, size = object.len(), "storage_object_read");

        Ok(object)
    }

    /// Write `content` to `bucket/key`, replacing any existing object.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = object_path(key)?;
        let store = self.bucket(bucket).await?;
        let size = content.len();

        let mut options = PutOptions::default();
        // The local filesystem backend cannot persist object attributes.
        if !matches!(self.inner.backend, Backend::Local { .. }) {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            options.attributes = attributes;
        }

        store
            .put_opts(&path, PutPayload::from_bytes(content), options)
            .await
            .map_err(|source| StorageError::Write {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;

        debug!(bucket = %bucket, key = %key, size = size, "storage_object_written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_put_then_get() {
        let client = StorageClient::in_memory();

        client
            .put("reports", "daily/sales.csv", Bytes::from_static(b"a,b\n1,2\n"), "text/csv")
            .await
            .unwrap();

        let object = client.get("reports", "daily/sales.csv").await.unwrap();
        assert_eq!(&object[..], b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_put_sets_content_type() {
        let client = StorageClient::in_memory();

        client
            .put("reports", "sales.csv", Bytes::from_static(b"x"), "text/csv")
            .await
            .unwrap();

        let store = client.bucket("reports").await.unwrap();
        let result = store.get(&Path::from("sales.csv")).await.unwrap();
        let content_type: Option<&str> = result
            .attributes
            .get(&Attribute::ContentType)
            .map(AsRef::as_ref);
        assert_eq!(content_type, Some("text/csv"));
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let client = StorageClient::in_memory();

        client
            .put("first", "key", Bytes::from_static(b"x"), "text/csv")
            .await
            .unwrap();

        let err = client.get("second", "key").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_bucket_handle_is_cached() {
        let client = StorageClient::in_memory();

        let a = client.bucket("reports").await.unwrap();
        let b = client.clone().bucket("reports").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_reserved_characters_are_kept_verbatim() {
        let client = StorageClient::in_memory();
        let key = "reports/[daily]~sales 1-1700000000.csv";

        client
            .put("reports", key, Bytes::from_static(b"x"), "text/csv")
            .await
            .unwrap();

        let store = client.bucket("reports").await.unwrap();
        let keys: Vec<String> = store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec![key.to_string()]);
        assert_eq!(&client.get("reports", key).await.unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn test_keys_that_would_be_rewritten_are_rejected() {
        let client = StorageClient::in_memory();

        for key in ["/leading/slash-1.csv", "trailing/", "a//b.csv", "a/../b.csv", ""] {
            let err = client
                .put("reports", key, Bytes::from_static(b"x"), "text/csv")
                .await
                .unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidKey { .. }),
                "key {key:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_empty_bucket_rejected() {
        let client = StorageClient::in_memory();
        assert!(matches!(
            client.get("", "key").await,
            Err(StorageError::EmptyBucket)
        ));
    }
}
