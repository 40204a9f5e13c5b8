//! Object storage providers for backup data
//!
//! S3 and GCS each offer the same three operations (store, retrieve, list a
//! directory) as concrete types. [`StorageProvider`] selects between them, or
//! none at all when backups stay on the pod's persistent volume.

pub mod gcs;
pub mod s3;

use std::path::Path as LocalPath;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use gcs::GcsStorage;
pub use s3::S3Storage;

/// Byte stream of an object being downloaded
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Which backend holds backup data
#[derive(Clone)]
pub enum StorageProvider {
    S3(S3Storage),
    Gcs(GcsStorage),
    /// Backups stay in the pod's own volume
    Pv,
}

/// Summary of a directory upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDirectory {
    /// `s3://bucket/key` or `gs://bucket/key` of the uploaded prefix
    pub location: String,
    pub files: u64,
    pub bytes: u64,
}

impl StorageProvider {
    /// Short provider name used in logs, metrics and status
    pub fn name(&self) -> &'static str {
        match self {
            StorageProvider::S3(_) => "s3",
            StorageProvider::Gcs(_) => "gcs",
            StorageProvider::Pv => "pv",
        }
    }

    /// Whether this provider moves data off the pod at all
    pub fn is_remote(&self) -> bool {
        !matches!(self, StorageProvider::Pv)
    }

    /// Configured folder prefix (empty for the pv provider)
    pub fn folder(&self) -> &str {
        match self {
            StorageProvider::S3(s3) => s3.folder(),
            StorageProvider::Gcs(gcs) => gcs.folder(),
            StorageProvider::Pv => "",
        }
    }

    pub async fn store<R>(&self, key: &str, body: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self {
            StorageProvider::S3(s3) => s3.store(key, body).await,
            StorageProvider::Gcs(gcs) => gcs.store(key, body).await,
            StorageProvider::Pv => Err(no_object_store()),
        }
    }

    pub async fn retrieve(&self, key: &str) -> Result<(ObjectReader, u64)> {
        match self {
            StorageProvider::S3(s3) => s3.retrieve(key).await,
            StorageProvider::Gcs(gcs) => gcs.retrieve(key).await,
            StorageProvider::Pv => Err(no_object_store()),
        }
    }

    pub async fn list_directory(&self, prefix: &str) -> Result<Vec<String>> {
        match self {
            StorageProvider::S3(s3) => s3.list_directory(prefix).await,
            StorageProvider::Gcs(gcs) => gcs.list_directory(prefix).await,
            StorageProvider::Pv => Err(no_object_store()),
        }
    }

    /// Prefix holding every file of one backup: `<folder>/<backup_id>`
    pub fn backup_prefix(&self, backup_id: &str) -> String {
        object_key(&[self.folder(), backup_id])
    }

    /// URL of a key in this provider's bucket
    pub fn location(&self, key: &str) -> Result<String> {
        match self {
            StorageProvider::S3(s3) => Ok(s3.location(key)),
            StorageProvider::Gcs(gcs) => Ok(gcs.location(key)),
            StorageProvider::Pv => Err(no_object_store()),
        }
    }

    /// Upload every regular file directly inside `dir` under
    /// `<folder>/<backup_id>/<file>`
    pub async fn store_directory(&self, dir: &LocalPath, backup_id: &str) -> Result<StoredDirectory> {
        if !self.is_remote() {
            return Err(no_object_store());
        }

        let prefix = self.backup_prefix(backup_id);
        let mut files = 0u64;
        let mut bytes = 0u64;

        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        for name in names {
            let key = object_key(&[&prefix, &name]);
            let file = tokio::fs::File::open(dir.join(&name)).await?;
            let written = self.store(&key, file).await?;
            debug!(key = %key, bytes = written, "Uploaded backup file");
            files += 1;
            bytes += written;
        }

        let location = self.location(&prefix)?;
        info!(
            provider = self.name(),
            location = %location,
            files = files,
            bytes = bytes,
            "Uploaded backup directory"
        );

        Ok(StoredDirectory {
            location,
            files,
            bytes,
        })
    }
}

/// Join key segments with `/`, skipping empty segments and stray slashes
pub fn object_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn no_object_store() -> Error {
    Error::storage("the pv provider keeps backups in the pod and has no object store")
}

/// Stream `body` into `key`, aborting the upload if the body fails
pub(crate) async fn put_stream<R>(store: &Arc<dyn ObjectStore>, key: &str, mut body: R) -> Result<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut writer = BufWriter::new(store.clone(), Path::from(key));
    let copied = match tokio::io::copy(&mut body, &mut writer).await {
        Ok(n) => n,
        Err(e) => {
            let _ = writer.abort().await;
            return Err(Error::storage(format!("uploading {}: {}", key, e)));
        }
    };
    writer
        .shutdown()
        .await
        .map_err(|e| Error::storage(format!("completing upload of {}: {}", key, e)))?;
    Ok(copied)
}

/// Open `key` for streaming, returning the reader and declared size
pub(crate) async fn get_stream(store: &Arc<dyn ObjectStore>, key: &str) -> Result<(ObjectReader, u64)> {
    let result = store.get(&Path::from(key)).await.map_err(|e| match e {
        object_store::Error::NotFound { .. } => Error::storage(format!("object {} not found", key)),
        other => Error::from(other),
    })?;
    let size = result.meta.size;
    let stream = result
        .into_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    Ok((Box::new(StreamReader::new(stream)), size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_skips_empty_segments() {
        assert_eq!(object_key(&["backup", "T1", "meta.00"]), "backup/T1/meta.00");
        assert_eq!(object_key(&["", "T1", "meta.00"]), "T1/meta.00");
        assert_eq!(object_key(&["backup/", "/T1"]), "backup/T1");
    }

    #[test]
    fn test_pv_provider_has_no_object_store() {
        let pv = StorageProvider::Pv;
        assert!(!pv.is_remote());
        assert_eq!(pv.name(), "pv");
        assert!(pv.location("x").is_err());
    }
}
