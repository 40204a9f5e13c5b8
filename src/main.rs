//! InfluxDB Kubernetes Operator
//!
//! Main entry point for the operator. Loads configuration, sets up the
//! Kubernetes client, registers CRD controllers, and runs the reconciliation
//! loops.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use influxdb_operator::{
    config::OperatorConfig,
    controllers::{self, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting InfluxDB Operator");

    let config = OperatorConfig::from_env()?;
    info!(
        backup_dir = %config.backup_dir,
        restore_dir = %config.restore_dir,
        exec_timeout_secs = config.exec_timeout.map(|t| t.as_secs()),
        "Loaded operator configuration"
    );
    let metrics_port = config.metrics_port;

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let context = Arc::new(Context::new(client.clone(), config));

    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let influxdb_controller = controllers::run_influxdb_controller(client.clone(), context.clone());
    let backup_controller = controllers::run_backup_controller(client.clone(), context.clone());
    let restore_controller = controllers::run_restore_controller(client.clone(), context.clone());

    tokio::select! {
        _ = influxdb_controller => {
            error!("Influxdb controller exited unexpectedly");
        }
        _ = backup_controller => {
            error!("Backup controller exited unexpectedly");
        }
        _ = restore_controller => {
            error!("Restore controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    metrics::OPERATOR_HEALTH.set(0.0);
    info!("InfluxDB Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
