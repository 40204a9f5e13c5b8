//! Storage configuration adapter
//!
//! Converts a CRD storage spec into a ready [`StorageProvider`], resolving
//! credentials from secrets on the way.

use kube::Client;

use crate::crd::{BackupStorageSpec, GcsStorageSpec, S3StorageSpec};
use crate::error::{Error, Result};
use crate::storage::s3::{S3Credentials, S3Settings};
use crate::storage::{GcsStorage, S3Storage, StorageProvider};

use super::secrets::resolve_secret_ref;

/// Check a storage spec without touching the cluster
pub fn validate_storage(storage: &BackupStorageSpec) -> Result<()> {
    match storage.provider.as_str() {
        "pv" => Ok(()),
        "s3" => {
            let s3 = storage
                .s3
                .as_ref()
                .ok_or_else(|| Error::validation("S3 configuration is required for the s3 provider"))?;
            if s3.bucket.is_empty() {
                return Err(Error::validation("S3 bucket is required"));
            }
            if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                return Err(Error::validation(
                    "S3 accessKeyId and secretAccessKey must be set together",
                ));
            }
            Ok(())
        }
        "gcs" => {
            let gcs = storage
                .gcs
                .as_ref()
                .ok_or_else(|| Error::validation("GCS configuration is required for the gcs provider"))?;
            if gcs.bucket.is_empty() {
                return Err(Error::validation("GCS bucket is required"));
            }
            if gcs.service_account.name.is_empty() || gcs.service_account.key.is_empty() {
                return Err(Error::validation("GCS serviceAccount secret name and key are required"));
            }
            Ok(())
        }
        other => Err(Error::validation(format!(
            "Unsupported storage provider: {} (expected s3, gcs or pv)",
            other
        ))),
    }
}

/// Build a storage provider from CRD spec
pub async fn build_storage_provider(
    storage: &BackupStorageSpec,
    client: &Client,
    namespace: &str,
) -> Result<StorageProvider> {
    validate_storage(storage)?;
    match storage.provider.as_str() {
        "s3" => build_s3_storage(storage.s3.as_ref(), client, namespace).await,
        "gcs" => build_gcs_storage(storage.gcs.as_ref(), client, namespace).await,
        _ => Ok(StorageProvider::Pv),
    }
}

async fn build_s3_storage(
    s3: Option<&S3StorageSpec>,
    client: &Client,
    namespace: &str,
) -> Result<StorageProvider> {
    let s3 = s3.ok_or_else(|| Error::config("S3 configuration is required for the s3 provider"))?;

    let credentials = match (&s3.access_key_id, &s3.secret_access_key) {
        (Some(key_id), Some(secret_key)) => Some(S3Credentials {
            access_key_id: resolve_secret_ref(client, key_id, namespace).await?,
            secret_access_key: resolve_secret_ref(client, secret_key, namespace).await?,
        }),
        _ => None,
    };

    let storage = S3Storage::new(S3Settings {
        bucket: s3.bucket.clone(),
        region: s3.region.clone(),
        endpoint: s3.endpoint.clone(),
        folder: s3.folder.clone(),
        credentials,
    })?;
    Ok(StorageProvider::S3(storage))
}

async fn build_gcs_storage(
    gcs: Option<&GcsStorageSpec>,
    client: &Client,
    namespace: &str,
) -> Result<StorageProvider> {
    let gcs = gcs.ok_or_else(|| Error::config("GCS configuration is required for the gcs provider"))?;
    let service_account = resolve_secret_ref(client, &gcs.service_account, namespace).await?;
    let storage = GcsStorage::new(gcs.bucket.clone(), gcs.folder.clone(), &service_account)?;
    Ok(StorageProvider::Gcs(storage))
}
