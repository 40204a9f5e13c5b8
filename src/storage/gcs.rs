//! Google Cloud Storage backup storage
//!
//! Service account credentials are handed to the client in memory, so any
//! number of providers with different accounts can be live at once.

use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::ObjectStore;
use tokio::io::AsyncRead;
use tracing::{error, info};

use crate::error::{Error, Result};

use super::{get_stream, put_stream, ObjectReader};

/// GCS bucket holding backups under a folder prefix
#[derive(Clone)]
pub struct GcsStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    folder: String,
}

impl GcsStorage {
    /// Build a client from a service account JSON key
    pub fn new(bucket: impl Into<String>, folder: impl Into<String>, service_account_json: &str) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(Error::config("GCS bucket name is required"));
        }
        serde_json::from_str::<serde_json::Value>(service_account_json)
            .map_err(|e| Error::credentials(format!("GCS service account is not valid JSON: {}", e)))?;

        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket.clone())
            .with_service_account_key(service_account_json)
            .build()
            .map_err(|e| Error::config(format!("Invalid GCS configuration: {}", e)))?;

        Ok(Self::with_store(Arc::new(store), bucket, folder))
    }

    /// Wrap an already constructed object store
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            folder: folder.into().trim_matches('/').to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub async fn store<R>(&self, key: &str, body: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let start = Instant::now();
        let bytes = put_stream(&self.store, key, body).await.map_err(|e| {
            error!(bucket = %self.bucket, key = %key, error = %e, "GCS upload failed");
            e
        })?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GCS upload successful"
        );
        Ok(bytes)
    }

    pub async fn retrieve(&self, key: &str) -> Result<(ObjectReader, u64)> {
        get_stream(&self.store, key).await
    }

    /// Every key under `prefix`, paging through the whole listing
    pub async fn list_directory(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = Path::from(prefix);
        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;
        Ok(objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }

    pub fn location(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_service_account() {
        let err = GcsStorage::new("bucket", "folder", "not json").err().unwrap();
        assert!(matches!(err, Error::CredentialResolution(_)));
    }

    #[test]
    fn test_location() {
        let gcs = GcsStorage::with_store(Arc::new(object_store::memory::InMemory::new()), "b", "f");
        assert_eq!(gcs.location("f/T1"), "gs://b/f/T1");
    }
}
