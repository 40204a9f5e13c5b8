//! InfluxdbBackup controller
//!
//! Runs scheduled and one-shot backups of an influxd pod. Uploaded data is
//! never touched when the resource is deleted.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::controllers::{requeue_for, Context};
use crate::crd::InfluxdbBackup;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::backup as backup_reconciler;

const FINALIZER_NAME: &str = "influxdata.com/backup-finalizer";

/// Requeue for a spec that fails validation
const INVALID_SPEC_RETRY: Duration = Duration::from_secs(300);

/// Requeue while the schedule is suspended
const SUSPENDED_RECHECK: Duration = Duration::from_secs(60);

/// Run the InfluxdbBackup controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<InfluxdbBackup> = Api::all(client.clone());

    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("InfluxdbBackup CRD not installed: {}", e);
        return;
    }

    info!("Starting InfluxdbBackup controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((backup, action)) => {
                    debug!(backup = %backup.name, next = ?action, "Backup reconciled");
                }
                Err(e) => {
                    error!(error = %e, "Backup reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&["InfluxdbBackup"]).inc();
                }
            }
        })
        .await;
}

#[instrument(
    skip(ctx),
    fields(
        backup = %obj.name_any(),
        namespace = obj.namespace(),
        pod = %obj.spec.pod_name,
        provider = %obj.spec.storage.provider
    )
)]
async fn reconcile(obj: Arc<InfluxdbBackup>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["InfluxdbBackup"])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&["InfluxdbBackup"]).inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<InfluxdbBackup> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(backup) => apply(backup, ctx.clone(), &namespace).await,
            FinalizerEvent::Cleanup(backup) => cleanup(backup).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

async fn apply(backup: Arc<InfluxdbBackup>, ctx: Arc<Context>, namespace: &str) -> Result<Action> {
    let generation = backup.metadata.generation.unwrap_or(0);
    let status = backup.status.as_ref();
    let observed = status.is_some_and(|s| s.observed_generation == Some(generation));
    let last_phase = status.and_then(|s| s.phase.as_deref());

    debug!(
        generation = generation,
        schedule = backup.spec.schedule.as_deref().unwrap_or("once"),
        last_phase = last_phase.unwrap_or("none"),
        last_backup = status.and_then(|s| s.backup_id.as_deref()).unwrap_or("none"),
        "Checking backup"
    );

    if let Err(e) = backup_reconciler::validate(&backup) {
        warn!(error = %e, "Backup spec rejected");
        // patching the same failure again would only trigger another reconcile
        if !(observed && last_phase == Some("Failed")) {
            backup_reconciler::update_status_failed(&backup, &ctx, namespace, &e.to_string()).await?;
        }
        return Ok(Action::requeue(INVALID_SPEC_RETRY));
    }

    if !observed {
        info!(generation = generation, "Backup spec accepted");
        backup_reconciler::update_status_ready(&backup, &ctx, namespace).await?;
    }

    if backup.spec.suspend {
        debug!("Backup schedule suspended");
        return Ok(Action::requeue(SUSPENDED_RECHECK));
    }

    backup_reconciler::check_schedule(&backup, &ctx, namespace).await
}

async fn cleanup(backup: Arc<InfluxdbBackup>) -> Result<Action> {
    let location = backup
        .status
        .as_ref()
        .and_then(|s| s.location.as_deref())
        .unwrap_or("none");
    info!(last_location = location, "Backup resource deleted, stored data kept");

    metrics::CLEANUPS.with_label_values(&["InfluxdbBackup"]).inc();

    Ok(Action::await_change())
}

fn error_policy(obj: Arc<InfluxdbBackup>, error: &Error, _ctx: Arc<Context>) -> Action {
    let action = requeue_for(error);
    error!(
        backup = %obj.name_any(),
        pod = %obj.spec.pod_name,
        error = %error,
        retry = ?action,
        "Backup reconcile failed"
    );
    action
}
