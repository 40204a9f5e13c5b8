use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::metrics::{POD_FILES_COPIED, STORAGE_BYTES};
use crate::remote::{ExecTarget, FileSpec};
use crate::storage::StorageProvider;

use super::command::{restore_command, validate_restore, RestoreOptions};
use super::Orchestrator;

/// One restore run against one pod
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    pub backup_id: String,
    pub options: RestoreOptions,
}

/// Result of a successful restore run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Directory inside the pod influxd restored from
    pub source_dir: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub files: u64,
    pub bytes: u64,
}

impl Orchestrator {
    /// Fetch a backup into the pod (unless it is already there) and run
    /// `influxd restore` on it
    #[instrument(skip(self, request, storage), fields(pod = %request.pod, backup_id = %request.backup_id, provider = storage.name()))]
    pub async fn run_restore(&self, request: &RestoreRequest, storage: &StorageProvider) -> Result<RestoreOutcome> {
        if request.backup_id.is_empty() || request.backup_id.contains('/') {
            return Err(Error::validation(format!("invalid backup id '{}'", request.backup_id)));
        }
        validate_restore(&request.options)?;

        let started_at = Utc::now();
        let (source_dir, files, bytes) = if storage.is_remote() {
            let dir = format!("{}/{}", self.config.restore_dir, request.backup_id);
            let prefix = storage.backup_prefix(&request.backup_id);
            let (files, bytes) = self
                .restore_prefix_into_pod(storage, &prefix, request, &dir)
                .await?;
            (dir, files, bytes)
        } else {
            (format!("{}/{}", self.config.backup_dir, request.backup_id), 0, 0)
        };

        let spec = FileSpec::in_pod(&request.namespace, &request.pod, &source_dir)?;
        let target = self
            .copier
            .resolve_target(&spec, request.container.as_deref())
            .await?;
        self.run_restore_command(&target, &request.options, &source_dir)
            .await?;

        Ok(RestoreOutcome {
            source_dir,
            started_at,
            completed_at: Utc::now(),
            files,
            bytes,
        })
    }

    /// Stream every object under `prefix` into `dest_dir` inside the pod,
    /// keeping the object names relative to the prefix
    pub async fn restore_prefix_into_pod(
        &self,
        storage: &StorageProvider,
        prefix: &str,
        request: &RestoreRequest,
        dest_dir: &str,
    ) -> Result<(u64, u64)> {
        let keys = storage.list_directory(prefix).await?;
        if keys.is_empty() {
            return Err(Error::NoSuchEntry(storage.location(prefix)?));
        }

        let mut files = 0u64;
        let mut bytes = 0u64;
        for key in keys {
            let name = key
                .strip_prefix(prefix)
                .unwrap_or(&key)
                .trim_start_matches('/');
            if name.is_empty() {
                continue;
            }

            let (reader, size) = storage.retrieve(&key).await?;
            let dest = FileSpec::in_pod(&request.namespace, &request.pod, &format!("{}/{}", dest_dir, name))?;
            debug!(key = %key, dest = %dest, size = size, "Restoring object into pod");

            let sent = self
                .copier
                .copy_to_pod(reader, size, &dest.to_string(), request.container.as_deref())
                .await?;
            STORAGE_BYTES
                .with_label_values(&[storage.name(), "download"])
                .inc_by(sent as f64);
            POD_FILES_COPIED.with_label_values(&["into_pod"]).inc();

            files += 1;
            bytes += sent;
        }

        info!(prefix = %prefix, dest = %dest_dir, files = files, bytes = bytes, "Backup files copied into pod");
        Ok((files, bytes))
    }

    async fn run_restore_command(&self, target: &ExecTarget, options: &RestoreOptions, source_dir: &str) -> Result<()> {
        let command = restore_command(options, source_dir)?;
        info!(command = ?command, "Running restore command");
        self.copier.executor().exec(target, &command, None).await?;
        Ok(())
    }
}
