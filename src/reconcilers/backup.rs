//! InfluxdbBackup reconciler
//!
//! Handles the business logic for backup operations including:
//! - Spec validation
//! - Schedule checking
//! - Backup execution
//! - Status updates

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use kube::{
    api::{Patch, PatchParams},
    runtime::controller::Action,
    Api, ResourceExt,
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::adapters::{build_storage_provider, validate_storage};
use crate::controllers::Context;
use crate::crd::InfluxdbBackup;
use crate::error::{Error, Result};
use crate::metrics;
use crate::orchestrator::{BackupOptions, BackupOutcome, BackupRequest};

use super::FIELD_MANAGER;

/// Wait between a failed attempt and the next one
const FAILURE_RETRY: Duration = Duration::from_secs(300);

/// Validate the InfluxdbBackup spec
pub fn validate(backup: &InfluxdbBackup) -> Result<()> {
    let spec = &backup.spec;

    if spec.pod_name.is_empty() {
        return Err(Error::validation("podName must be specified"));
    }

    if !spec.retention.is_empty() && spec.database.is_empty() {
        return Err(Error::validation("retention requires database"));
    }
    if !spec.shard.is_empty() && spec.retention.is_empty() {
        return Err(Error::validation("shard requires retention"));
    }

    for (field, value) in [("start", &spec.start), ("end", &spec.end)] {
        if !value.is_empty() && DateTime::parse_from_rfc3339(value).is_err() {
            return Err(Error::validation(format!(
                "{} must be an RFC3339 timestamp, got '{}'",
                field, value
            )));
        }
    }

    validate_storage(&spec.storage)?;

    if let Some(schedule) = &spec.schedule {
        Schedule::from_str(schedule)
            .map_err(|e| Error::validation(format!("Invalid cron schedule '{}': {}", schedule, e)))?;
    }

    Ok(())
}

/// Check if a backup should run based on the schedule
pub async fn check_schedule(backup: &InfluxdbBackup, ctx: &Context, namespace: &str) -> Result<Action> {
    let name = backup.name_any();

    if let Some(wait) = retry_delay(backup, Utc::now()) {
        info!(name = %name, wait_secs = wait.as_secs(), "Last backup attempt failed, waiting before retry");
        return Ok(Action::requeue(wait));
    }

    // one-shot backups run once per generation
    let Some(schedule_str) = &backup.spec.schedule else {
        if let Some(status) = &backup.status {
            if status.phase.as_deref() == Some("Completed")
                && status.observed_generation == backup.metadata.generation
            {
                return Ok(Action::await_change());
            }
        }
        return execute_backup(backup, ctx, namespace).await;
    };

    let schedule = Schedule::from_str(schedule_str)
        .map_err(|e| Error::validation(format!("Invalid cron schedule: {}", e)))?;

    let now = Utc::now();
    if should_run_backup(backup, &schedule, now) {
        info!(name = %name, "Scheduled backup time reached, executing backup");
        return execute_backup(backup, ctx, namespace).await;
    }

    Ok(Action::requeue(requeue_until_next(&schedule, now)))
}

/// Whether a scheduled fire time has passed since the last backup
pub fn should_run_backup(backup: &InfluxdbBackup, schedule: &Schedule, now: DateTime<Utc>) -> bool {
    let last_backup = backup.status.as_ref().and_then(|s| s.last_backup_time);

    match last_backup {
        None => true,
        Some(last) => schedule.after(&last).next().is_some_and(|due| due <= now),
    }
}

/// Remaining back-off after a failed attempt at the current generation
pub fn retry_delay(backup: &InfluxdbBackup, now: DateTime<Utc>) -> Option<Duration> {
    let status = backup.status.as_ref()?;
    if status.phase.as_deref() != Some("Failed") || status.observed_generation != backup.metadata.generation {
        return None;
    }
    let failed_at = status.completed_at?;
    let elapsed = (now - failed_at).to_std().unwrap_or_default();
    FAILURE_RETRY.checked_sub(elapsed).filter(|wait| !wait.is_zero())
}

/// Time to wait before looking at the schedule again, at most five minutes
pub fn requeue_until_next(schedule: &Schedule, now: DateTime<Utc>) -> Duration {
    let next_run = schedule
        .after(&now)
        .next()
        .unwrap_or_else(|| now + chrono::Duration::hours(1));
    let until_next = (next_run - now).to_std().unwrap_or(Duration::from_secs(60));
    until_next.min(Duration::from_secs(300))
}

fn next_scheduled(backup: &InfluxdbBackup) -> Option<DateTime<Utc>> {
    backup.spec.schedule.as_ref().and_then(|s| {
        Schedule::from_str(s)
            .ok()
            .and_then(|sched| sched.upcoming(Utc).next())
    })
}

/// Execute a backup operation
async fn execute_backup(backup: &InfluxdbBackup, ctx: &Context, namespace: &str) -> Result<Action> {
    let name = backup.name_any();
    let api: Api<InfluxdbBackup> = Api::namespaced(ctx.client.clone(), namespace);

    info!(name = %name, pod = %backup.spec.pod_name, "Starting backup execution");

    let running_status = json!({
        "status": {
            "phase": "Running",
            "message": "Backup in progress",
            "startedAt": Utc::now(),
            "observedGeneration": backup.metadata.generation,
        }
    });
    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(running_status))
        .await?;

    let timer = metrics::BACKUP_DURATION
        .with_label_values(&[namespace, &name])
        .start_timer();
    let result = execute_backup_internal(backup, ctx, namespace).await;
    timer.observe_duration();

    match result {
        Ok(outcome) => {
            info!(
                name = %name,
                backup_id = %outcome.backup_id,
                location = %outcome.location,
                files = outcome.files,
                bytes = outcome.bytes,
                "Backup completed successfully"
            );

            metrics::BACKUPS_TOTAL
                .with_label_values(&["success", namespace, &name])
                .inc();
            metrics::BACKUP_SIZE_BYTES
                .with_label_values(&[namespace, &name])
                .set(outcome.bytes as f64);

            let status = completed_status(backup, &outcome, next_scheduled(backup));
            api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
                .await?;

            if backup.spec.schedule.is_some() {
                Ok(Action::requeue(Duration::from_secs(60)))
            } else {
                Ok(Action::await_change())
            }
        }
        Err(e) => {
            error!(name = %name, error = %e, "Backup failed");

            metrics::BACKUPS_TOTAL
                .with_label_values(&["failure", namespace, &name])
                .inc();

            let status = failed_status(backup, &format!("Backup failed: {}", e), "BackupFailed");
            api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
                .await?;

            Ok(Action::requeue(FAILURE_RETRY))
        }
    }
}

async fn execute_backup_internal(backup: &InfluxdbBackup, ctx: &Context, namespace: &str) -> Result<BackupOutcome> {
    let storage = build_storage_provider(&backup.spec.storage, &ctx.client, namespace).await?;
    let request = BackupRequest {
        namespace: namespace.to_string(),
        pod: backup.spec.pod_name.clone(),
        container: non_empty(&backup.spec.container_name),
        options: BackupOptions::from(&backup.spec),
    };
    ctx.orchestrator.run_backup(&request, &storage).await
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Status patch recording a successful backup
pub fn completed_status(
    backup: &InfluxdbBackup,
    outcome: &BackupOutcome,
    next_backup: Option<DateTime<Utc>>,
) -> Value {
    json!({
        "status": {
            "phase": "Completed",
            "message": "Backup completed successfully",
            "location": outcome.location,
            "backupId": outcome.backup_id,
            "startedAt": outcome.started_at,
            "completedAt": outcome.completed_at,
            "lastBackupTime": outcome.completed_at,
            "nextScheduledBackup": next_backup,
            "filesUploaded": outcome.files,
            "bytesUploaded": outcome.bytes,
            "observedGeneration": backup.metadata.generation,
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "lastTransitionTime": Utc::now(),
                "reason": "BackupSucceeded",
                "message": format!("Backup stored at {}", outcome.location)
            }]
        }
    })
}

/// Status patch recording a failed backup or an invalid spec
pub fn failed_status(backup: &InfluxdbBackup, message: &str, reason: &str) -> Value {
    json!({
        "status": {
            "phase": "Failed",
            "message": message,
            "completedAt": Utc::now(),
            "observedGeneration": backup.metadata.generation,
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

/// Update status to Ready
pub async fn update_status_ready(backup: &InfluxdbBackup, ctx: &Context, namespace: &str) -> Result<()> {
    let name = backup.name_any();
    let api: Api<InfluxdbBackup> = Api::namespaced(ctx.client.clone(), namespace);

    let message = if backup.spec.schedule.is_some() {
        "Backup schedule is active"
    } else {
        "Backup accepted"
    };

    let status = json!({
        "status": {
            "phase": "Ready",
            "message": message,
            "nextScheduledBackup": next_scheduled(backup),
            "observedGeneration": backup.metadata.generation,
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "lastTransitionTime": Utc::now(),
                "reason": "SpecValid",
                "message": message
            }]
        }
    });

    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
        .await?;

    Ok(())
}

/// Update status to Failed
pub async fn update_status_failed(
    backup: &InfluxdbBackup,
    ctx: &Context,
    namespace: &str,
    error_message: &str,
) -> Result<()> {
    let name = backup.name_any();
    let api: Api<InfluxdbBackup> = Api::namespaced(ctx.client.clone(), namespace);

    let status = failed_status(backup, error_message, "ValidationFailed");
    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
        .await?;

    Ok(())
}
