//! Expands a [`ThanosReceiver`] into the ordered list of [`ResourceProducer`]s that describe the
//! desired state of the cluster.
//!
//! The entry point is [`resource_factory`]. It merges the configuration of every receiver group
//! with the configured defaults and emits one producer per resource. Producers are pure; running
//! them against a cluster is the job of [`crate::cluster_resources`].
use std::{collections::BTreeSet, sync::Arc};

use k8s_openapi::{
    api::{
        apps::v1::StatefulSet,
        core::v1::{ConfigMap, Service},
        networking::v1::Ingress,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    ResourceExt,
    core::{ApiResource, DynamicObject},
};
use serde::Serialize;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::debug;

use crate::{
    builder::meta::{self, ObjectMetaBuilder},
    config::fragment::ValidationError,
    crd::{
        APP_NAME, ReceiverGroupConfig, ReceiverGroupDefaults, ThanosReceiver,
        service_monitor::ServiceMonitor,
    },
    kvp::{
        Label, LabelError, Labels,
        consts::{K8S_APP_INSTANCE_KEY, K8S_APP_MANAGED_BY_KEY, K8S_APP_NAME_KEY, RECEIVER_GROUP_KEY},
    },
};

pub mod args;
mod hashring;
mod ingress;
mod service;
mod service_monitor;
mod statefulset;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to merge the configuration of receiver group {group:?}"))]
    ValidateGroupConfig {
        source: ValidationError,
        group: String,
    },

    #[snafu(display("receiver group {group:?} is defined more than once"))]
    DuplicateGroupName { group: String },

    #[snafu(display("object has no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to build metadata for {name:?}"))]
    BuildObjectMeta { source: meta::Error, name: String },

    #[snafu(display("failed to build label"))]
    BuildLabel { source: LabelError },

    #[snafu(display("{kind} can only be produced for a receiver group"))]
    MissingReceiverGroup { kind: ResourceKind },

    #[snafu(display("failed to serialize the hashring of receiver group {group:?}"))]
    SerializeHashring {
        source: serde_json::Error,
        group: String,
    },

    #[snafu(display("failed to quote the value of external label {key:?}"))]
    QuoteLabelValue {
        source: serde_json::Error,
        key: String,
    },

    #[snafu(display("failed to convert {name:?} into a dynamic object"))]
    ConvertToDynamic {
        source: serde_json::Error,
        name: String,
    },
}

/// A receiver group whose configuration has been merged with all defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedReceiverGroup {
    pub name: String,
    pub config: ReceiverGroupConfig,
}

/// The context every resource of a [`ThanosReceiver`] is built in.
///
/// Without a group this describes the resources shared by all groups, such as the common
/// Service. The group is held behind an [`Arc`] so that all producers of one group can share the
/// same merged configuration without copying it.
#[derive(Clone, Debug)]
pub struct ReceiverInstance<'a> {
    receiver: &'a ThanosReceiver,
    cluster_domain: &'a str,
    group: Option<Arc<MergedReceiverGroup>>,
}

impl<'a> ReceiverInstance<'a> {
    pub fn new(receiver: &'a ThanosReceiver, cluster_domain: &'a str) -> Self {
        Self {
            receiver,
            cluster_domain,
            group: None,
        }
    }

    /// Returns a copy of this context scoped to `group`.
    pub fn for_group(&self, group: Arc<MergedReceiverGroup>) -> Self {
        Self {
            group: Some(group),
            ..self.clone()
        }
    }

    pub fn group(&self) -> Option<&MergedReceiverGroup> {
        self.group.as_deref()
    }

    pub fn cluster_domain(&self) -> &str {
        self.cluster_domain
    }

    pub fn namespace(&self) -> Result<String> {
        self.receiver.namespace().context(ObjectHasNoNamespaceSnafu)
    }

    /// The resource name `<receiver>-receiver[-<group>][-<suffix>]`.
    pub fn name(&self, suffix: Option<&str>) -> String {
        let mut name = format!("{}-{APP_NAME}", self.receiver.name_any());
        if let Some(group) = self.group() {
            name.push('-');
            name.push_str(&group.name);
        }
        if let Some(suffix) = suffix.filter(|suffix| !suffix.is_empty()) {
            name.push('-');
            name.push_str(suffix);
        }
        name
    }

    /// The labels carried by every resource of this context. They are also used as selector, so
    /// a group-less context selects the pods of all groups.
    pub fn labels(&self) -> Result<Labels> {
        let receiver_name = self.receiver.name_any();
        let common = Labels::try_from_iter([
            (K8S_APP_INSTANCE_KEY, receiver_name.as_str()),
            (K8S_APP_MANAGED_BY_KEY, receiver_name.as_str()),
        ])
        .context(BuildLabelSnafu)?;

        let mut group_labels = Labels::new();
        if let Some(group) = self.group() {
            group_labels
                .try_insert((RECEIVER_GROUP_KEY, group.name.as_str()))
                .context(BuildLabelSnafu)?;
        }

        let name = Label::try_from((K8S_APP_NAME_KEY, APP_NAME)).context(BuildLabelSnafu)?;
        Ok(Labels::from_iter([name]).merge([&common, &group_labels]))
    }

    /// Metadata of the resource named [`Self::name`] with `suffix`, owned by the receiver.
    pub fn meta(&self, suffix: Option<&str>) -> Result<ObjectMeta> {
        let name = self.name(suffix);
        Ok(ObjectMetaBuilder::new()
            .name(&name)
            .namespace_opt(self.receiver.namespace())
            .ownerreference_from_resource(self.receiver, Some(true))
            .context(BuildObjectMetaSnafu { name: &name })?
            .with_labels(self.labels()?)
            .build())
    }

    fn require_group(&self, kind: ResourceKind) -> Result<&MergedReceiverGroup> {
        self.group().context(MissingReceiverGroupSnafu { kind })
    }
}

/// Whether a resource should exist in the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum DesiredState {
    Present,
    Absent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ResourceKind {
    CommonService,
    StatefulSet,
    Hashring,
    GroupService,
    ServiceMonitor,
    GrpcIngress,
    HttpIngress,
}

impl ResourceKind {
    /// The resources produced for every receiver group, in order.
    pub const GROUP_KINDS: [ResourceKind; 6] = [
        ResourceKind::StatefulSet,
        ResourceKind::Hashring,
        ResourceKind::GroupService,
        ResourceKind::ServiceMonitor,
        ResourceKind::GrpcIngress,
        ResourceKind::HttpIngress,
    ];
}

/// A fully built resource.
#[derive(Clone, Debug, PartialEq)]
pub enum DesiredResource {
    StatefulSet(StatefulSet),
    ConfigMap(ConfigMap),
    Service(Service),
    ServiceMonitor(ServiceMonitor),
    Ingress(Ingress),
}

impl DesiredResource {
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::StatefulSet(sts) => &sts.metadata,
            Self::ConfigMap(cm) => &cm.metadata,
            Self::Service(svc) => &svc.metadata,
            Self::ServiceMonitor(sm) => &sm.metadata,
            Self::Ingress(ing) => &ing.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    pub fn api_resource(&self) -> ApiResource {
        match self {
            Self::StatefulSet(_) => ApiResource::erase::<StatefulSet>(&()),
            Self::ConfigMap(_) => ApiResource::erase::<ConfigMap>(&()),
            Self::Service(_) => ApiResource::erase::<Service>(&()),
            Self::ServiceMonitor(_) => ApiResource::erase::<ServiceMonitor>(&()),
            Self::Ingress(_) => ApiResource::erase::<Ingress>(&()),
        }
    }

    /// Converts the resource into an untyped object, keeping `apiVersion` and `kind`.
    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        match self {
            Self::StatefulSet(sts) => to_dynamic(sts, self.name()),
            Self::ConfigMap(cm) => to_dynamic(cm, self.name()),
            Self::Service(svc) => to_dynamic(svc, self.name()),
            Self::ServiceMonitor(sm) => to_dynamic(sm, self.name()),
            Self::Ingress(ing) => to_dynamic(ing, self.name()),
        }
    }
}

fn to_dynamic<T: Serialize>(resource: &T, name: &str) -> Result<DynamicObject> {
    serde_json::to_value(resource)
        .and_then(serde_json::from_value)
        .context(ConvertToDynamicSnafu { name })
}

/// Lazily builds one resource of a [`ReceiverInstance`].
#[derive(Clone, Debug)]
pub struct ResourceProducer<'a> {
    kind: ResourceKind,
    instance: ReceiverInstance<'a>,
}

impl<'a> ResourceProducer<'a> {
    pub fn new(kind: ResourceKind, instance: ReceiverInstance<'a>) -> Self {
        Self { kind, instance }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn instance(&self) -> &ReceiverInstance<'a> {
        &self.instance
    }

    pub fn produce(&self) -> Result<(DesiredResource, DesiredState)> {
        let instance = &self.instance;
        match self.kind {
            ResourceKind::CommonService => Ok((
                DesiredResource::Service(service::build_common_service(instance)?),
                DesiredState::Present,
            )),
            ResourceKind::StatefulSet => {
                let group = instance.require_group(self.kind)?;
                Ok((
                    DesiredResource::StatefulSet(statefulset::build_statefulset(instance, group)?),
                    DesiredState::Present,
                ))
            }
            ResourceKind::Hashring => {
                let group = instance.require_group(self.kind)?;
                Ok((
                    DesiredResource::ConfigMap(hashring::build_hashring(instance, group)?),
                    DesiredState::Present,
                ))
            }
            ResourceKind::GroupService => {
                let group = instance.require_group(self.kind)?;
                Ok((
                    DesiredResource::Service(service::build_group_service(instance, group)?),
                    DesiredState::Present,
                ))
            }
            ResourceKind::ServiceMonitor => {
                instance.require_group(self.kind)?;
                Ok((
                    DesiredResource::ServiceMonitor(service_monitor::build_service_monitor(
                        instance,
                    )?),
                    DesiredState::Present,
                ))
            }
            ResourceKind::GrpcIngress => {
                let group = instance.require_group(self.kind)?;
                let (ingress, state) = ingress::build_grpc_ingress(instance, group)?;
                Ok((DesiredResource::Ingress(ingress), state))
            }
            ResourceKind::HttpIngress => {
                let group = instance.require_group(self.kind)?;
                let (ingress, state) = ingress::build_http_ingress(instance, group)?;
                Ok((DesiredResource::Ingress(ingress), state))
            }
        }
    }
}

/// Builds the producers for every resource of `receiver`.
///
/// The common Service comes first, followed by the resources of each receiver group in the order
/// the groups are declared. The configuration of each group is layered over `spec.defaults` and
/// then over `defaults`; neither is modified. Any group that fails to merge aborts the whole
/// call.
pub fn resource_factory<'a>(
    receiver: &'a ThanosReceiver,
    defaults: &ReceiverGroupDefaults,
    cluster_domain: &'a str,
) -> Result<Vec<ResourceProducer<'a>>> {
    let instance = ReceiverInstance::new(receiver, cluster_domain);
    let groups = &receiver.spec.receiver_groups;

    let mut producers = Vec::with_capacity(1 + groups.len() * ResourceKind::GROUP_KINDS.len());
    producers.push(ResourceProducer::new(
        ResourceKind::CommonService,
        instance.clone(),
    ));

    let mut seen = BTreeSet::new();
    for group in groups {
        ensure!(
            seen.insert(group.name.as_str()),
            DuplicateGroupNameSnafu { group: &group.name }
        );

        let config = group
            .merged_config(&receiver.spec.defaults, defaults)
            .context(ValidateGroupConfigSnafu { group: &group.name })?;
        let group_instance = instance.for_group(Arc::new(MergedReceiverGroup {
            name: group.name.clone(),
            config,
        }));

        for kind in ResourceKind::GROUP_KINDS {
            debug!(group = %group.name, %kind, "adding resource producer");
            producers.push(ResourceProducer::new(kind, group_instance.clone()));
        }
    }

    Ok(producers)
}
