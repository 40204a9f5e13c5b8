//! InfluxdbRestore controller
//!
//! A restore runs at most once per generation. Completed, failed and
//! interrupted restores wait for the spec to change.

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
use crate::crd::{InfluxdbRestore, InfluxdbRestoreStatus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::restore as restore_reconciler;

const FINALIZER_NAME: &str = "influxdata.com/restore-finalizer";

/// Requeue for a spec that fails validation
const INVALID_SPEC_RETRY: Duration = Duration::from_secs(300);

/// Run the InfluxdbRestore controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<InfluxdbRestore> = Api::all(client.clone());

    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("InfluxdbRestore CRD not installed: {}", e);
        return;
    }

    info!("Starting InfluxdbRestore controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((restore, action)) => {
                    debug!(restore = %restore.name, next = ?action, "Restore reconciled");
                }
                Err(e) => {
                    error!(error = %e, "Restore reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&["InfluxdbRestore"]).inc();
                }
            }
        })
        .await;
}

#[instrument(
    skip(ctx),
    fields(
        restore = %obj.name_any(),
        namespace = obj.namespace(),
        pod = %obj.spec.pod_name,
        backup_id = %obj.spec.backup_id
    )
)]
async fn reconcile(obj: Arc<InfluxdbRestore>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["InfluxdbRestore"])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&["InfluxdbRestore"]).inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<InfluxdbRestore> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(restore) => apply(restore, ctx.clone(), &namespace).await,
            FinalizerEvent::Cleanup(_) => cleanup().await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// Phase already reached by the current generation, if any
fn settled_phase(status: Option<&InfluxdbRestoreStatus>, generation: i64) -> Option<&str> {
    status
        .filter(|s| s.observed_generation == Some(generation))
        .and_then(|s| s.phase.as_deref())
}

async fn apply(restore: Arc<InfluxdbRestore>, ctx: Arc<Context>, namespace: &str) -> Result<Action> {
    let generation = restore.metadata.generation.unwrap_or(0);

    match settled_phase(restore.status.as_ref(), generation) {
        Some(phase @ ("Completed" | "Failed")) => {
            debug!(phase = phase, "Restore already finished for this generation");
            return Ok(Action::await_change());
        }
        Some("Running") => {
            // interrupted by an operator restart; the run is not resumed
            warn!(generation = generation, "Restore was interrupted, waiting for a spec change");
            return Ok(Action::await_change());
        }
        _ => {}
    }

    if let Err(e) = restore_reconciler::validate(&restore) {
        warn!(error = %e, "Restore spec rejected");
        restore_reconciler::update_status_failed(&restore, &ctx, namespace, &e.to_string()).await?;
        return Ok(Action::requeue(INVALID_SPEC_RETRY));
    }

    let database = match restore.spec.database.as_str() {
        "" => "all",
        name => name,
    };
    info!(
        generation = generation,
        provider = %restore.spec.storage.provider,
        database = database,
        "Restore spec accepted"
    );
    restore_reconciler::execute(&restore, &ctx, namespace).await
}

async fn cleanup() -> Result<Action> {
    debug!("Restore resource deleted");
    metrics::CLEANUPS.with_label_values(&["InfluxdbRestore"]).inc();
    Ok(Action::await_change())
}

fn error_policy(obj: Arc<InfluxdbRestore>, error: &Error, _ctx: Arc<Context>) -> Action {
    let action = requeue_for(error);
    error!(
        restore = %obj.name_any(),
        backup_id = %obj.spec.backup_id,
        error = %error,
        retry = ?action,
        "Restore reconcile failed"
    );
    action
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(phase: &str, observed: i64) -> InfluxdbRestoreStatus {
        InfluxdbRestoreStatus {
            phase: Some(phase.to_string()),
            observed_generation: Some(observed),
            ..Default::default()
        }
    }

    #[test]
    fn test_settled_phase_only_counts_current_generation() {
        let done = status("Completed", 2);
        assert_eq!(settled_phase(Some(&done), 2), Some("Completed"));
        assert_eq!(settled_phase(Some(&done), 3), None);
        assert_eq!(settled_phase(None, 1), None);
    }
}
