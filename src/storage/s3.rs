//! Amazon S3 (and S3 compatible) backup storage

use std::sync::Arc;
use std::time::Instant;

use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use tokio::io::AsyncRead;
use tracing::{error, info};

use crate::error::{Error, Result};

use super::{get_stream, put_stream, ObjectReader};

/// Static S3 access keys resolved from secrets
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Settings needed to reach a bucket
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3 compatible services (MinIO, Ceph, ...)
    pub endpoint: Option<String>,
    pub folder: String,
    /// Falls back to the standard AWS environment when unset
    pub credentials: Option<S3Credentials>,
}

/// S3 bucket holding backups under a folder prefix
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    folder: String,
}

impl S3Storage {
    pub fn new(settings: S3Settings) -> Result<Self> {
        if settings.bucket.is_empty() {
            return Err(Error::config("S3 bucket name is required"));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(settings.bucket.clone())
            .with_region(settings.region.clone());

        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"));
        }

        if let Some(credentials) = &settings.credentials {
            builder = builder
                .with_access_key_id(credentials.access_key_id.clone())
                .with_secret_access_key(credentials.secret_access_key.clone());
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Invalid S3 configuration: {}", e)))?;

        Ok(Self::with_store(Arc::new(store), settings.bucket, settings.folder))
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

    /// Upload `body` under `key`; the body is consumed on every path
    pub async fn store<R>(&self, key: &str, body: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let start = Instant::now();
        let bytes = put_stream(&self.store, key, body).await.map_err(|e| {
            error!(bucket = %self.bucket, key = %key, error = %e, "S3 upload failed");
            e
        })?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );
        Ok(bytes)
    }

    /// Open `key` for download; the caller owns the returned stream
    pub async fn retrieve(&self, key: &str) -> Result<(ObjectReader, u64)> {
        get_stream(&self.store, key).await
    }

    /// Keys one level below `prefix`
    pub async fn list_directory(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = Path::from(prefix);
        let listing = self.store.list_with_delimiter(Some(&prefix)).await?;
        Ok(listing
            .objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }

    pub fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
