//! InfluxDB Kubernetes Operator
//!
//! Runs InfluxDB clusters and their backups and restores from Custom
//! Resource Definitions. Backups are produced by `influxd` inside the pod,
//! copied out over the exec API as a tar stream and shipped to S3 or GCS.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod reconcilers;
pub mod remote;
pub mod storage;

pub use error::{Error, Result};
