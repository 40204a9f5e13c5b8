//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "influxdb_operator_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "influxdb_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "influxdb_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Total number of backups
    pub static ref BACKUPS_TOTAL: CounterVec = register_counter_vec!(
        "influxdb_operator_backups_total",
        "Total number of backups by outcome",
        &["outcome", "namespace", "name"]
    ).unwrap();

    /// Backup size in bytes
    pub static ref BACKUP_SIZE_BYTES: GaugeVec = register_gauge_vec!(
        "influxdb_operator_backup_size_bytes",
        "Size of last uploaded backup in bytes",
        &["namespace", "name"]
    ).unwrap();

    /// Backup duration histogram
    pub static ref BACKUP_DURATION: HistogramVec = register_histogram_vec!(
        "influxdb_operator_backup_duration_seconds",
        "Duration of backup operations",
        &["namespace", "name"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    /// Total number of restores
    pub static ref RESTORES_TOTAL: CounterVec = register_counter_vec!(
        "influxdb_operator_restores_total",
        "Total number of restores by outcome",
        &["outcome", "namespace", "name"]
    ).unwrap();

    /// Restore duration histogram
    pub static ref RESTORE_DURATION: HistogramVec = register_histogram_vec!(
        "influxdb_operator_restore_duration_seconds",
        "Duration of restore operations",
        &["namespace", "name"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    /// Bytes moved between object storage and pods
    pub static ref STORAGE_BYTES: CounterVec = register_counter_vec!(
        "influxdb_operator_storage_bytes_total",
        "Bytes transferred to or from object storage",
        &["provider", "direction"]
    ).unwrap();

    /// Files copied out of or into pods
    pub static ref POD_FILES_COPIED: CounterVec = register_counter_vec!(
        "influxdb_operator_pod_files_copied_total",
        "Files copied out of or into pods",
        &["direction"]
    ).unwrap();

    /// Total number of cleanup operations
    pub static ref CLEANUPS: CounterVec = register_counter_vec!(
        "influxdb_operator_cleanups_total",
        "Total number of cleanup operations",
        &["kind"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "influxdb_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path()))
}

fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" => {
            if OPERATOR_HEALTH.get() > 0.0 {
                text_response(StatusCode::OK, "ok")
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            }
        }
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(route("/healthz").status(), StatusCode::OK);
        assert_eq!(route("/nope").status(), StatusCode::NOT_FOUND);

        STORAGE_BYTES.with_label_values(&["s3", "upload"]).inc_by(5.0);
        assert_eq!(route("/metrics").status(), StatusCode::OK);
    }
}
