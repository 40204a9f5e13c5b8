//! Kubernetes controllers for InfluxDB CRDs
//!
//! This module contains the controller implementations that watch for CRD changes
//! and trigger reconciliation.

mod backup_controller;
mod influxdb_controller;
mod restore_controller;

pub use backup_controller::run as run_backup_controller;
pub use influxdb_controller::run as run_influxdb_controller;
pub use restore_controller::run as run_restore_controller;

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::Client;

use crate::config::OperatorConfig;
use crate::error::Error;
use crate::orchestrator::Orchestrator;
use crate::remote::KubeExecutor;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Backup/restore orchestrator
    pub orchestrator: Orchestrator,
}

impl Context {
    /// Create a context that execs into pods through `client`
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        let executor = Arc::new(KubeExecutor::new(client.clone(), config.exec_timeout));
        Self {
            client,
            orchestrator: Orchestrator::new(config, executor),
        }
    }
}

/// Requeue delay for a failed reconciliation, by error kind
pub fn requeue_for(error: &Error) -> Action {
    let requeue_duration = match error.root() {
        Error::Kube(_) | Error::Connection(_) => Duration::from_secs(30),
        Error::Config(_) | Error::Validation(_) | Error::FileSpec(_) => Duration::from_secs(300),
        Error::CredentialResolution(_) => Duration::from_secs(120),
        Error::Storage(_) | Error::Timeout(_) => Duration::from_secs(60),
        Error::PodNotRunning { .. } => Duration::from_secs(60),
        _ => Duration::from_secs(30),
    };
    Action::requeue(requeue_duration)
}
