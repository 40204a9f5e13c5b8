//! InfluxdbRestore Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{default_container, BackupStorageSpec, Condition};

/// InfluxdbRestore resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "influxdata.com",
    version = "v1alpha1",
    kind = "InfluxdbRestore",
    plural = "influxdbrestores",
    singular = "influxdbrestore",
    shortname = "ir",
    namespaced,
    status = "InfluxdbRestoreStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Backup", "type": "string", "jsonPath": ".spec.backupId"}"#,
    printcolumn = r#"{"name": "Files", "type": "integer", "jsonPath": ".status.filesRestored"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbRestoreSpec {
    /// Pod running influxd
    pub pod_name: String,

    /// Container running influxd
    #[serde(default = "default_container")]
    pub container_name: String,

    /// Backup identifier (UTC timestamp, YYYYMMDDHHMMSS)
    pub backup_id: String,

    /// Database to restore (all databases if unset)
    #[serde(default)]
    pub database: String,

    /// Restore into a database with a different name (requires database)
    #[serde(default)]
    pub restore_to_database: String,

    /// Retention policy to restore (requires database)
    #[serde(default)]
    pub rp: String,

    /// Restore into a retention policy with a different name (requires rp)
    #[serde(default)]
    pub new_rp: String,

    /// Shard ID to restore (requires database and rp)
    #[serde(default)]
    pub shard: String,

    /// Where the backup files are read from
    pub storage: BackupStorageSpec,
}

/// InfluxdbRestore status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbRestoreStatus {
    /// Current phase (Pending, Running, Completed, Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_restored: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_restored: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
