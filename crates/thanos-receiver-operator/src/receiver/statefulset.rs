use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{StatefulSet, StatefulSetSpec},
        core::v1::{
            ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
            EnvVarSource, HTTPGetAction, ObjectFieldSelector, PersistentVolumeClaim,
            PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe, Volume,
            VolumeMount, VolumeResourceRequirements,
        },
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};

use super::{
    MergedReceiverGroup, ReceiverInstance, Result,
    args::{DATA_DIR, HASHRING_DIR, POD_NAME_ENV, receiver_args},
    hashring::HASHRING_SUFFIX,
};
use crate::crd::{APP_NAME, GRPC_PORT_NAME, HTTP_PORT_NAME, REMOTE_WRITE_PORT_NAME};

const DATA_VOLUME_NAME: &str = "data";
const HASHRING_VOLUME_NAME: &str = "hashring";

pub(super) fn build_statefulset(
    instance: &ReceiverInstance,
    group: &MergedReceiverGroup,
) -> Result<StatefulSet> {
    let config = &group.config;
    let labels: BTreeMap<String, String> = instance.labels()?.into();

    let mut volumes = vec![Volume {
        name: HASHRING_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: instance.name(Some(HASHRING_SUFFIX)),
            ..ConfigMapVolumeSource::default()
        }),
        ..Volume::default()
    }];

    // Without a size the TSDB lives as long as the pod
    let volume_claim_templates = match &config.storage_size {
        Some(size) => Some(vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(DATA_VOLUME_NAME.to_string()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_string(), size.clone())])),
                    ..VolumeResourceRequirements::default()
                }),
                ..PersistentVolumeClaimSpec::default()
            }),
            ..PersistentVolumeClaim::default()
        }]),
        None => {
            volumes.push(Volume {
                name: DATA_VOLUME_NAME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Volume::default()
            });
            None
        }
    };

    let container = Container {
        name: APP_NAME.to_string(),
        image: Some(config.image.clone()),
        args: Some(receiver_args(instance, group)?),
        env: Some(vec![EnvVar {
            name: POD_NAME_ENV.to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_string(),
                    ..ObjectFieldSelector::default()
                }),
                ..EnvVarSource::default()
            }),
            ..EnvVar::default()
        }]),
        ports: Some(vec![
            container_port(GRPC_PORT_NAME, config.ports.grpc),
            container_port(HTTP_PORT_NAME, config.ports.http),
            container_port(REMOTE_WRITE_PORT_NAME, config.ports.remote_write),
        ]),
        readiness_probe: Some(http_probe("/-/ready")),
        liveness_probe: Some(http_probe("/-/healthy")),
        volume_mounts: Some(vec![
            VolumeMount {
                name: DATA_VOLUME_NAME.to_string(),
                mount_path: DATA_DIR.to_string(),
                ..VolumeMount::default()
            },
            VolumeMount {
                name: HASHRING_VOLUME_NAME.to_string(),
                mount_path: HASHRING_DIR.to_string(),
                read_only: Some(true),
                ..VolumeMount::default()
            },
        ]),
        ..Container::default()
    };

    Ok(StatefulSet {
        metadata: instance.meta(None)?,
        spec: Some(StatefulSetSpec {
            replicas: Some(i32::from(config.replicas)),
            service_name: Some(instance.name(None)),
            pod_management_policy: Some("Parallel".to_string()),
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
                    volumes: Some(volumes),
                    ..PodSpec::default()
                }),
            },
            volume_claim_templates,
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    })
}

fn container_port(name: &str, port: u16) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: i32::from(port),
        protocol: Some("TCP".to_string()),
        ..ContainerPort::default()
    }
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(HTTP_PORT_NAME.to_string()),
            ..HTTPGetAction::default()
        }),
        period_seconds: Some(10),
        failure_threshold: Some(3),
        ..Probe::default()
    }
}
