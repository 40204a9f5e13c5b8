//! Influxdb Custom Resource Definition

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Influxdb resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "influxdata.com",
    version = "v1alpha1",
    kind = "Influxdb",
    plural = "influxdbs",
    singular = "influxdb",
    shortname = "idb",
    namespaced,
    status = "InfluxdbStatus",
    printcolumn = r#"{"name": "Size", "type": "integer", "jsonPath": ".spec.size"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbSpec {
    /// Number of influxd replicas
    #[serde(default = "default_size")]
    pub size: i32,

    /// Container image
    #[serde(default = "default_image")]
    pub image: String,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Persistent data volume; an emptyDir is used if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvc: Option<InfluxdbPvcSpec>,

    /// Compute resources for the influxd container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<InfluxdbResources>,

    /// Pod affinity, in the core/v1 Affinity format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub affinity: Option<serde_json::Value>,

    /// Tolerations applied to the influxd pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<InfluxdbToleration>,
}

fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..SchemaObject::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

fn default_size() -> i32 {
    1
}

fn default_image() -> String {
    "influxdb:1.8".to_string()
}

/// Volume claim template for influxd data
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbPvcSpec {
    /// Storage class name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Storage size (e.g., "10Gi")
    #[serde(default = "default_pvc_size")]
    pub size: String,
}

fn default_pvc_size() -> String {
    "10Gi".to_string()
}

/// Resource quantities keyed by resource name (cpu, memory, ...)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct InfluxdbResources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Toleration for scheduling onto tainted nodes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbToleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Exists or Equal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// NoSchedule, PreferNoSchedule or NoExecute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

/// Influxdb status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbStatus {
    /// Pod names backing the resource
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Current phase (Pending, Ready)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Headless service name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Volume claim of the first replica, when a pvc is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
