//! Prometheus metrics for the InfluxDB Operator
//!
//! Reconcile, backup, restore and transfer metrics plus the health endpoints.

mod prometheus;

pub use prometheus::*;
