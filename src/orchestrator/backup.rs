use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::Result;
use crate::metrics::{POD_FILES_COPIED, STORAGE_BYTES};
use crate::remote::FileSpec;
use crate::storage::StorageProvider;

use super::command::{backup_command, backup_id, BackupOptions};
use super::Orchestrator;

/// One backup run against one pod
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub namespace: String,
    pub pod: String,
    /// First container of the pod when unset
    pub container: Option<String>,
    pub options: BackupOptions,
}

/// Result of a successful backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub backup_id: String,
    /// `s3://bucket/key`, `gs://bucket/key`, or the path inside the pod for pv
    pub location: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub files: u64,
    pub bytes: u64,
}

impl Orchestrator {
    /// Run `influxd backup` in the pod, then ship the result to `storage`
    #[instrument(skip(self, request, storage), fields(pod = %request.pod, namespace = %request.namespace, provider = storage.name()))]
    pub async fn run_backup(&self, request: &BackupRequest, storage: &StorageProvider) -> Result<BackupOutcome> {
        let started_at = Utc::now();
        let id = backup_id(started_at);
        let remote_dir = format!("{}/{}", self.config.backup_dir, id);
        let remote = FileSpec::in_pod(&request.namespace, &request.pod, &remote_dir)?;

        let target = self
            .copier
            .resolve_target(&remote, request.container.as_deref())
            .await?;

        let command = backup_command(&request.options, &remote_dir);
        info!(backup_id = %id, command = ?command, "Running backup command");
        self.copier.executor().exec(&target, &command, None).await?;

        if !storage.is_remote() {
            info!(backup_id = %id, location = %remote_dir, "Backup kept on pod volume");
            return Ok(BackupOutcome {
                backup_id: id,
                location: remote_dir,
                started_at,
                completed_at: Utc::now(),
                files: 0,
                bytes: 0,
            });
        }

        let staging = self.staging_dir("influxdb-backup-")?;
        let copied = self
            .copier
            .copy_from_pod(&remote.to_string(), staging.path(), Some(&target.container))
            .await?;
        POD_FILES_COPIED
            .with_label_values(&["from_pod"])
            .inc_by(copied as f64);

        let stored = storage.store_directory(staging.path(), &id).await?;
        STORAGE_BYTES
            .with_label_values(&[storage.name(), "upload"])
            .inc_by(stored.bytes as f64);

        Ok(BackupOutcome {
            backup_id: id,
            location: stored.location,
            started_at,
            completed_at: Utc::now(),
            files: stored.files,
            bytes: stored.bytes,
        })
    }
}
