//! InfluxdbRestore reconciler
//!
//! Validates the restore request, runs it once per generation and records
//! the result in status.

use chrono::Utc;
use kube::{
    api::{Patch, PatchParams},
    runtime::controller::Action,
    Api, ResourceExt,
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::adapters::{build_storage_provider, validate_storage};
use crate::controllers::Context;
use crate::crd::InfluxdbRestore;
use crate::error::{Error, Result};
use crate::metrics;
use crate::orchestrator::command::validate_restore;
use crate::orchestrator::{RestoreOptions, RestoreOutcome, RestoreRequest};

use super::backup::non_empty;
use super::FIELD_MANAGER;

/// Validate the InfluxdbRestore spec
pub fn validate(restore: &InfluxdbRestore) -> Result<()> {
    let spec = &restore.spec;

    if spec.pod_name.is_empty() {
        return Err(Error::validation("podName must be specified"));
    }
    if spec.backup_id.is_empty() {
        return Err(Error::validation("backupId must be specified"));
    }
    if spec.backup_id.contains('/') {
        return Err(Error::validation(format!(
            "backupId '{}' must not contain '/'",
            spec.backup_id
        )));
    }

    validate_restore(&RestoreOptions::from(spec))?;
    validate_storage(&spec.storage)?;

    Ok(())
}

/// Execute a restore operation
pub async fn execute(restore: &InfluxdbRestore, ctx: &Context, namespace: &str) -> Result<Action> {
    let name = restore.name_any();
    let api: Api<InfluxdbRestore> = Api::namespaced(ctx.client.clone(), namespace);

    info!(name = %name, backup_id = %restore.spec.backup_id, "Starting restore execution");

    let running_status = json!({
        "status": {
            "phase": "Running",
            "message": "Restore in progress",
            "startedAt": Utc::now(),
            "observedGeneration": restore.metadata.generation,
        }
    });
    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(running_status))
        .await?;

    let timer = metrics::RESTORE_DURATION
        .with_label_values(&[namespace, &name])
        .start_timer();
    let result = execute_restore_internal(restore, ctx, namespace).await;
    timer.observe_duration();

    match result {
        Ok(outcome) => {
            info!(
                name = %name,
                files = outcome.files,
                bytes = outcome.bytes,
                source = %outcome.source_dir,
                "Restore completed successfully"
            );

            metrics::RESTORES_TOTAL
                .with_label_values(&["success", namespace, &name])
                .inc();

            let status = completed_status(restore, &outcome);
            api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
                .await?;

            Ok(Action::await_change())
        }
        Err(e) => {
            error!(name = %name, error = %e, "Restore failed");

            metrics::RESTORES_TOTAL
                .with_label_values(&["failure", namespace, &name])
                .inc();

            let status = failed_status(restore, &format!("Restore failed: {}", e), "RestoreFailed");
            api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
                .await?;

            Ok(Action::await_change())
        }
    }
}

async fn execute_restore_internal(restore: &InfluxdbRestore, ctx: &Context, namespace: &str) -> Result<RestoreOutcome> {
    let storage = build_storage_provider(&restore.spec.storage, &ctx.client, namespace).await?;
    let request = RestoreRequest {
        namespace: namespace.to_string(),
        pod: restore.spec.pod_name.clone(),
        container: non_empty(&restore.spec.container_name),
        backup_id: restore.spec.backup_id.clone(),
        options: RestoreOptions::from(&restore.spec),
    };
    ctx.orchestrator.run_restore(&request, &storage).await
}

/// Status patch recording a successful restore
pub fn completed_status(restore: &InfluxdbRestore, outcome: &RestoreOutcome) -> Value {
    json!({
        "status": {
            "phase": "Completed",
            "message": format!("Restored backup {}", restore.spec.backup_id),
            "filesRestored": outcome.files,
            "bytesRestored": outcome.bytes,
            "startedAt": outcome.started_at,
            "completedAt": outcome.completed_at,
            "observedGeneration": restore.metadata.generation,
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "lastTransitionTime": Utc::now(),
                "reason": "RestoreSucceeded",
                "message": "Restore completed successfully"
            }]
        }
    })
}

/// Status patch recording a failed restore or an invalid spec
pub fn failed_status(restore: &InfluxdbRestore, message: &str, reason: &str) -> Value {
    json!({
        "status": {
            "phase": "Failed",
            "message": message,
            "observedGeneration": restore.metadata.generation,
            "conditions": [{
                "type": "Ready",
                "status": "False",
                "lastTransitionTime": Utc::now(),
                "reason": reason,
                "message": message
            }]
        }
    })
}

/// Update status to Failed
pub async fn update_status_failed(
    restore: &InfluxdbRestore,
    ctx: &Context,
    namespace: &str,
    error_message: &str,
) -> Result<()> {
    let name = restore.name_any();
    let api: Api<InfluxdbRestore> = Api::namespaced(ctx.client.clone(), namespace);

    let status = failed_status(restore, error_message, "ValidationFailed");
    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
        .await?;

    Ok(())
}
