//! InfluxdbBackup Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// InfluxdbBackup resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "influxdata.com",
    version = "v1alpha1",
    kind = "InfluxdbBackup",
    plural = "influxdbbackups",
    singular = "influxdbbackup",
    shortname = "ib",
    namespaced,
    status = "InfluxdbBackupStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Database", "type": "string", "jsonPath": ".spec.database"}"#,
    printcolumn = r#"{"name": "Location", "type": "string", "jsonPath": ".status.location"}"#,
    printcolumn = r#"{"name": "Last Backup", "type": "string", "jsonPath": ".status.lastBackupTime"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbBackupSpec {
    /// Pod running influxd
    pub pod_name: String,

    /// Container running influxd
    #[serde(default = "default_container")]
    pub container_name: String,

    /// Database to back up (all databases if unset)
    #[serde(default)]
    pub database: String,

    /// Retention policy (requires database)
    #[serde(default)]
    pub retention: String,

    /// Shard ID (requires retention)
    #[serde(default)]
    pub shard: String,

    /// Only include data at or after this RFC3339 timestamp
    #[serde(default)]
    pub start: String,

    /// Only include data before this RFC3339 timestamp
    #[serde(default)]
    pub end: String,

    /// Relative window used when neither start nor end is set
    #[serde(default)]
    pub since: String,

    /// influxd RPC address as seen from inside the pod
    #[serde(default = "default_host")]
    pub host: String,

    /// Where the backup files end up
    pub storage: BackupStorageSpec,

    /// Cron schedule for automated backups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Suspend backups (useful for maintenance)
    #[serde(default)]
    pub suspend: bool,
}

pub(crate) fn default_container() -> String {
    "influxdb".to_string()
}

fn default_host() -> String {
    "127.0.0.1:8088".to_string()
}

/// Storage specification shared by backups and restores
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageSpec {
    /// Storage provider (s3, gcs, pv)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// S3 storage configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageSpec>,

    /// GCS storage configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsStorageSpec>,
}

fn default_provider() -> String {
    "pv".to_string()
}

/// S3 storage specification
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3StorageSpec {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint (for MinIO, Ceph, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Folder within the bucket
    #[serde(default)]
    pub folder: String,

    /// Access key ID; the operator's own AWS environment is used if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<SecretKeyRef>,

    /// Secret access key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<SecretKeyRef>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// GCS storage specification
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GcsStorageSpec {
    /// GCS bucket name
    pub bucket: String,

    /// Folder within the bucket
    #[serde(default)]
    pub folder: String,

    /// Service account JSON key
    pub service_account: SecretKeyRef,
}

/// Reference to one key of a Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,

    /// Key in the secret's data
    pub key: String,

    /// Secret namespace (defaults to the resource's namespace)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// The stored value is itself base64 encoded
    #[serde(default)]
    pub base64: bool,
}

/// InfluxdbBackup status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbBackupStatus {
    /// Current phase (Pending, Running, Completed, Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Where the last successful backup was stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Identifier of the current/last backup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Last backup timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backup_time: Option<DateTime<Utc>>,

    /// Next scheduled backup timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scheduled_backup: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_uploaded: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_uploaded: Option<u64>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
