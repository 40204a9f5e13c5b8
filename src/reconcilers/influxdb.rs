//! Influxdb reconciler
//!
//! Server-side applies the StatefulSet and headless Service that run influxd
//! and records the resulting pod names in status.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EmptyDirVolumeSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, Pod, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec, Toleration, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{
    api::{ListParams, ObjectMeta, Patch, PatchParams},
    runtime::controller::Action,
    Api, Resource, ResourceExt,
};
use serde_json::json;
use tracing::info;

use crate::controllers::Context;
use crate::crd::{Influxdb, InfluxdbResources, InfluxdbToleration};
use crate::error::{Error, Result};

use super::FIELD_MANAGER;

/// Container name used for influxd
pub const CONTAINER_NAME: &str = "influxdb";

/// influxd data directory; backups and restores are staged below it
pub const DATA_DIR: &str = "/var/lib/influxdb";

const DATA_VOLUME: &str = "data";

/// Validate the Influxdb spec
pub fn validate(influxdb: &Influxdb) -> Result<()> {
    if influxdb.spec.size < 0 {
        return Err(Error::validation(format!(
            "size must not be negative, got {}",
            influxdb.spec.size
        )));
    }
    if influxdb.spec.image.is_empty() {
        return Err(Error::validation("image must be specified"));
    }
    if let Some(pvc) = &influxdb.spec.pvc {
        if pvc.size.is_empty() {
            return Err(Error::validation("pvc.size must be specified"));
        }
    }
    for toleration in &influxdb.spec.tolerations {
        match toleration.operator.as_deref() {
            None | Some("Exists") | Some("Equal") => {}
            Some(other) => {
                return Err(Error::validation(format!(
                    "toleration operator must be Exists or Equal, got '{}'",
                    other
                )))
            }
        }
    }
    affinity(influxdb).map_err(|e| Error::validation(format!("invalid affinity: {}", e)))?;
    Ok(())
}

fn affinity(influxdb: &Influxdb) -> Result<Option<Affinity>> {
    match &influxdb.spec.affinity {
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        None => Ok(None),
    }
}

fn resource_requirements(resources: &InfluxdbResources) -> ResourceRequirements {
    let quantities = |list: &BTreeMap<String, String>| -> Option<BTreeMap<String, Quantity>> {
        (!list.is_empty()).then(|| {
            list.iter()
                .map(|(name, amount)| (name.clone(), Quantity(amount.clone())))
                .collect()
        })
    };
    ResourceRequirements {
        limits: quantities(&resources.limits),
        requests: quantities(&resources.requests),
        ..ResourceRequirements::default()
    }
}

fn toleration(t: &InfluxdbToleration) -> Toleration {
    Toleration {
        key: t.key.clone(),
        operator: t.operator.clone(),
        value: t.value.clone(),
        effect: t.effect.clone(),
        toleration_seconds: t.toleration_seconds,
    }
}

/// Labels selecting the pods of one Influxdb resource
pub fn labels_for(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "influxdb".to_string()),
        ("influxdb_cr".to_string(), name.to_string()),
    ])
}

/// Name of the headless service fronting the pods
pub fn service_name(name: &str) -> String {
    format!("{}-svc", name)
}

/// Volume claim the StatefulSet creates for its first replica
pub fn claim_name(name: &str) -> String {
    format!("{}-{}-0", DATA_VOLUME, name)
}

fn object_meta(influxdb: &Influxdb, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: influxdb.namespace(),
        labels: Some(labels_for(&influxdb.name_any())),
        owner_references: influxdb.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..ObjectMeta::default()
    }
}

/// Desired StatefulSet for an Influxdb resource
///
/// Fails only when the affinity does not parse as a core/v1 Affinity.
pub fn statefulset_for(influxdb: &Influxdb) -> Result<StatefulSet> {
    let name = influxdb.name_any();
    let labels = labels_for(&name);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(influxdb.spec.image.clone()),
        image_pull_policy: influxdb.spec.image_pull_policy.clone(),
        resources: influxdb.spec.resources.as_ref().map(resource_requirements),
        ports: Some(vec![
            ContainerPort {
                name: Some("api".to_string()),
                container_port: 8086,
                protocol: Some("TCP".to_string()),
                ..ContainerPort::default()
            },
            ContainerPort {
                name: Some("rpc".to_string()),
                container_port: 8088,
                protocol: Some("TCP".to_string()),
                ..ContainerPort::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    };

    let (volumes, claims) = match &influxdb.spec.pvc {
        Some(pvc) => {
            let claim = PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(DATA_VOLUME.to_string()),
                    ..ObjectMeta::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: pvc.storage_class_name.clone(),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(pvc.size.clone()),
                        )])),
                        ..VolumeResourceRequirements::default()
                    }),
                    ..PersistentVolumeClaimSpec::default()
                }),
                ..PersistentVolumeClaim::default()
            };
            (None, Some(vec![claim]))
        }
        None => {
            let volume = Volume {
                name: DATA_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Volume::default()
            };
            (Some(vec![volume]), None)
        }
    };

    let tolerations = &influxdb.spec.tolerations;

    Ok(StatefulSet {
        metadata: object_meta(influxdb, name.clone()),
        spec: Some(StatefulSetSpec {
            service_name: service_name(&name),
            replicas: Some(influxdb.spec.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes,
                    affinity: affinity(influxdb)?,
                    tolerations: (!tolerations.is_empty())
                        .then(|| tolerations.iter().map(toleration).collect()),
                    ..PodSpec::default()
                }),
            },
            volume_claim_templates: claims,
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    })
}

/// Desired headless Service for an Influxdb resource
pub fn service_for(influxdb: &Influxdb) -> Service {
    let name = influxdb.name_any();
    Service {
        metadata: object_meta(influxdb, service_name(&name)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(labels_for(&name)),
            ports: Some(vec![
                ServicePort {
                    name: Some("api".to_string()),
                    port: 8086,
                    ..ServicePort::default()
                },
                ServicePort {
                    name: Some("rpc".to_string()),
                    port: 8088,
                    ..ServicePort::default()
                },
            ]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Apply the workload and refresh status
pub async fn reconcile_cluster(influxdb: &Influxdb, ctx: &Context, namespace: &str) -> Result<Action> {
    let name = influxdb.name_any();
    let params = PatchParams::apply(FIELD_MANAGER).force();

    let services: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    let service = service_for(influxdb);
    services
        .patch(&service_name(&name), &params, &Patch::Apply(&service))
        .await?;

    let statefulsets: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
    let statefulset = statefulset_for(influxdb)?;
    let applied = statefulsets
        .patch(&name, &params, &Patch::Apply(&statefulset))
        .await?;

    let selector = labels_for(&name)
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), namespace);
    let mut nodes: Vec<String> = pods
        .list(&ListParams::default().labels(&selector))
        .await?
        .items
        .iter()
        .map(|pod| pod.name_any())
        .collect();
    nodes.sort();

    let ready = applied
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let phase = if ready >= influxdb.spec.size { "Ready" } else { "Pending" };

    info!(name = %name, nodes = ?nodes, ready = ready, phase = phase, "Influxdb workload applied");

    let status = json!({
        "status": {
            "nodes": nodes,
            "phase": phase,
            "serviceName": service_name(&name),
            "persistentVolumeClaimName": influxdb.spec.pvc.as_ref().map(|_| claim_name(&name)),
            "observedGeneration": influxdb.metadata.generation,
        }
    });
    let api: Api<Influxdb> = Api::namespaced(ctx.client.clone(), namespace);
    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
        .await?;

    if phase == "Ready" {
        Ok(Action::requeue(Duration::from_secs(300)))
    } else {
        Ok(Action::requeue(Duration::from_secs(15)))
    }
}
