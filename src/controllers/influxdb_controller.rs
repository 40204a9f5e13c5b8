//! Influxdb controller
//!
//! Watches Influxdb resources and the StatefulSets they own. Owned objects
//! are garbage collected through owner references, so no finalizer is used.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::{requeue_for, Context};
use crate::crd::Influxdb;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::influxdb as influxdb_reconciler;

/// Run the Influxdb controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Influxdb> = Api::all(client.clone());

    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Influxdb CRD not installed: {}", e);
        return;
    }

    info!("Starting Influxdb controller");

    let statefulsets: Api<StatefulSet> = Api::all(client.clone());
    Controller::new(api, WatcherConfig::default())
        .owns(statefulsets, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Influxdb"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&["Influxdb"]).inc();
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Influxdb>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["Influxdb"])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&["Influxdb"]).inc();

    if obj.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Err(e) = influxdb_reconciler::validate(&obj) {
        warn!(error = %e, "Validation failed");
        return Ok(Action::requeue(Duration::from_secs(300)));
    }

    influxdb_reconciler::reconcile_cluster(&obj, &ctx, &namespace).await
}

fn error_policy(obj: Arc<Influxdb>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    requeue_for(error)
}
