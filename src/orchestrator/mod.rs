//! Backup and restore orchestration
//!
//! Each run is a fixed sequence of steps against one pod and one storage
//! provider. The first failing step ends the run; retries are left to the
//! controller's requeue.

mod backup;
pub mod command;
mod restore;

use std::sync::Arc;

use tempfile::TempDir;

use crate::config::OperatorConfig;
use crate::error::Result;
use crate::remote::{PodCopier, RemoteExecutor};

pub use backup::{BackupOutcome, BackupRequest};
pub use command::{backup_command, backup_id, restore_command, BackupOptions, RestoreOptions};
pub use restore::{RestoreOutcome, RestoreRequest};

/// Drives backup and restore runs
#[derive(Clone)]
pub struct Orchestrator {
    config: OperatorConfig,
    copier: PodCopier,
}

impl Orchestrator {
    pub fn new(config: OperatorConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            config,
            copier: PodCopier::new(executor),
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn copier(&self) -> &PodCopier {
        &self.copier
    }

    /// Scratch directory removed when the returned guard drops
    fn staging_dir(&self, purpose: &str) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(purpose);
        let dir = match &self.config.staging_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}
