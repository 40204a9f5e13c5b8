//! Reconcilers for InfluxDB CRDs
//!
//! This module contains the business logic for reconciling each CRD type.
//! Reconcilers are responsible for:
//! - Validating CRD specs
//! - Running backups and restores through the orchestrator
//! - Applying the influxd workload
//! - Updating resource status

pub mod backup;
pub mod influxdb;
pub mod restore;

/// Field manager used for every patch the operator sends
pub const FIELD_MANAGER: &str = "influxdb-operator";
