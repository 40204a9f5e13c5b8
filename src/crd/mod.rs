//! Custom Resource Definitions for the InfluxDB Operator

mod influxdb;
mod influxdb_backup;
mod influxdb_restore;

pub use influxdb::*;
pub use influxdb_backup::*;
pub use influxdb_restore::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![
        serde_yaml::to_string(&Influxdb::crd())?,
        serde_yaml::to_string(&InfluxdbBackup::crd())?,
        serde_yaml::to_string(&InfluxdbRestore::crd())?,
    ])
}
