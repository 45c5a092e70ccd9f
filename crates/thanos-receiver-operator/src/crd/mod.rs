//! The `ThanosReceiver` custom resource and the configuration of its receiver groups.
use std::{collections::BTreeMap, path::Path, sync::LazyLock};

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::config::{
    fragment::{self, FromFragment, ValidationError, Validator},
    merge::{Atomic, Merge, chainable_merge, merge},
};

pub mod service_monitor;

/// The role name of every resource created for a `ThanosReceiver`, also used as the base of all
/// resource names (`<receiver>-receiver[-<suffix>]`).
pub const APP_NAME: &str = "receiver";
pub const OPERATOR_NAME: &str = "receiver.thanos.io";
pub const FIELD_MANAGER_SCOPE: &str = "thanosreceiver";

pub const GRPC_PORT_NAME: &str = "grpc";
pub const HTTP_PORT_NAME: &str = "http";
pub const REMOTE_WRITE_PORT_NAME: &str = "remote-write";

pub const DEFAULT_IMAGE: &str = "quay.io/thanos/thanos:v0.37.2";
pub const DEFAULT_GRPC_PORT: u16 = 10901;
pub const DEFAULT_HTTP_PORT: u16 = 10902;
pub const DEFAULT_REMOTE_WRITE_PORT: u16 = 19291;

static GROUP_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("failed to compile group name regex")
});

const GROUP_NAME_MAX_LEN: usize = 40;

/// Prometheus label names, which external labels are attached as.
static EXTERNAL_LABEL_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("failed to compile external label name regex")
});

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read receiver group defaults from {path:?}"))]
    ReadDefaults {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[snafu(display("failed to parse receiver group defaults from {path:?}"))]
    ParseDefaults {
        source: serde_yaml::Error,
        path: std::path::PathBuf,
    },
}

/// A Thanos Receiver fan-in tier, made up of zero or more receiver groups.
///
/// Every group gets its own StatefulSet, hashring, Service, ServiceMonitor and (optionally)
/// Ingresses. A single Service selecting all receivers of all groups is always created.
#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "receiver.thanos.io",
    version = "v1alpha1",
    kind = "ThanosReceiver",
    plural = "thanosreceivers",
    shortname = "receiver",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ThanosReceiverSpec {
    /// Configuration applied to every receiver group which does not set a value itself.
    #[serde(default)]
    pub defaults: ReceiverGroupConfigFragment,

    /// The receiver groups, in the order they are reconciled.
    #[serde(default)]
    pub receiver_groups: Vec<ReceiverGroup>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverGroup {
    /// Name of the group, used in the names of all resources of this group.
    pub name: String,

    #[serde(flatten)]
    pub config: ReceiverGroupConfigFragment,
}

/// The (possibly partial) configuration of a receiver group, as it is written by users.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverGroupConfigFragment {
    /// Number of receiver replicas (and hashring endpoints) in this group.
    pub replicas: Option<u16>,

    /// The Thanos container image.
    pub image: Option<String>,

    /// How many receivers every write is replicated to. Must not exceed `replicas`.
    pub replication_factor: Option<u16>,

    /// How long samples are kept in the local TSDB, e.g. `6h` or `15d`.
    pub retention: Option<String>,

    /// Size of the persistent volume per receiver. Without it an `emptyDir` is used.
    pub storage_size: Option<Quantity>,

    /// Tenants routed to this group's hashring. An empty list makes it the default hashring.
    pub tenants: Option<Vec<String>>,

    /// External labels attached to all series ingested by this group.
    pub external_labels: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub ports: ReceiverPortsFragment,

    /// Exposes the gRPC store API of this group. The Ingress is removed when unset.
    pub grpc_ingress: Option<IngressConfig>,

    /// Exposes the remote-write endpoint of this group. The Ingress is removed when unset.
    pub http_ingress: Option<IngressConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverPortsFragment {
    pub grpc: Option<u16>,
    pub http: Option<u16>,
    pub remote_write: Option<u16>,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    pub host: String,

    #[serde(default = "IngressConfig::default_path")]
    pub path: String,

    /// Name of the Secret holding the TLS certificate. TLS is disabled when empty.
    #[serde(default)]
    pub certificate: String,
}

impl IngressConfig {
    fn default_path() -> String {
        "/".to_string()
    }
}

impl Atomic for IngressConfig {}

impl Merge for ReceiverGroupConfigFragment {
    fn merge(&mut self, defaults: &Self) {
        self.replicas.merge(&defaults.replicas);
        self.image.merge(&defaults.image);
        self.replication_factor.merge(&defaults.replication_factor);
        self.retention.merge(&defaults.retention);
        self.storage_size.merge(&defaults.storage_size);
        self.tenants.merge(&defaults.tenants);
        self.external_labels.merge(&defaults.external_labels);
        self.ports.merge(&defaults.ports);
        self.grpc_ingress.merge(&defaults.grpc_ingress);
        self.http_ingress.merge(&defaults.http_ingress);
    }
}

impl Merge for ReceiverPortsFragment {
    fn merge(&mut self, defaults: &Self) {
        self.grpc.merge(&defaults.grpc);
        self.http.merge(&defaults.http);
        self.remote_write.merge(&defaults.remote_write);
    }
}

/// The fully merged and validated configuration of a receiver group.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceiverGroupConfig {
    pub replicas: u16,
    pub image: String,
    pub replication_factor: u16,
    pub retention: String,
    pub storage_size: Option<Quantity>,
    pub tenants: Vec<String>,
    pub external_labels: BTreeMap<String, String>,
    pub ports: ReceiverPorts,
    pub grpc_ingress: Option<IngressConfig>,
    pub http_ingress: Option<IngressConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiverPorts {
    pub grpc: u16,
    pub http: u16,
    pub remote_write: u16,
}

impl FromFragment for ReceiverPorts {
    type Fragment = ReceiverPortsFragment;

    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            grpc: u16::from_fragment(fragment.grpc, validator.field(&"grpc"))?,
            http: u16::from_fragment(fragment.http, validator.field(&"http"))?,
            remote_write: u16::from_fragment(
                fragment.remote_write,
                validator.field(&"remoteWrite"),
            )?,
        })
    }
}

impl FromFragment for ReceiverGroupConfig {
    type Fragment = ReceiverGroupConfigFragment;

    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError> {
        let replicas = u16::from_fragment(fragment.replicas, validator.field(&"replicas"))?;
        if replicas == 0 {
            return Err(validator
                .field(&"replicas")
                .error_invalid("at least one replica is required"));
        }

        let replication_factor = u16::from_fragment(
            fragment.replication_factor,
            validator.field(&"replicationFactor"),
        )?;
        if replication_factor == 0 || replication_factor > replicas {
            return Err(validator.field(&"replicationFactor").error_invalid(format!(
                "must be between 1 and the number of replicas ({replicas})"
            )));
        }

        let image = String::from_fragment(fragment.image, validator.field(&"image"))?;
        ensure_not_blank(&image, validator.field(&"image"))?;

        let retention = String::from_fragment(fragment.retention, validator.field(&"retention"))?;
        ensure_not_blank(&retention, validator.field(&"retention"))?;

        let labels_validator = validator.field(&"externalLabels");
        let external_labels =
            BTreeMap::<String, String>::from_fragment(fragment.external_labels, labels_validator)?;
        if let Some(key) = external_labels
            .keys()
            .find(|key| !EXTERNAL_LABEL_NAME_REGEX.is_match(key))
        {
            return Err(validator
                .field(&"externalLabels")
                .field(key)
                .error_invalid("must be a Prometheus label name"));
        }

        Ok(Self {
            replicas,
            image,
            replication_factor,
            retention,
            storage_size: fragment.storage_size,
            tenants: Vec::<String>::from_fragment(fragment.tenants, validator.field(&"tenants"))?,
            external_labels,
            ports: ReceiverPorts::from_fragment(fragment.ports, validator.field(&"ports"))?,
            grpc_ingress: validate_ingress(fragment.grpc_ingress, validator.field(&"grpcIngress"))?,
            http_ingress: validate_ingress(fragment.http_ingress, validator.field(&"httpIngress"))?,
        })
    }
}

fn ensure_not_blank(value: &str, validator: Validator) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(validator.error_invalid("must not be empty"));
    }
    Ok(())
}

fn validate_ingress(
    ingress: Option<IngressConfig>,
    validator: Validator,
) -> Result<Option<IngressConfig>, ValidationError> {
    if let Some(ingress) = &ingress {
        ensure_not_blank(&ingress.host, validator.field(&"host"))?;
    }
    Ok(ingress)
}

/// The operator-wide receiver group defaults.
///
/// Constructed once at startup and shared read-only with every reconciliation; it is the widest
/// configuration layer and is never modified by merging.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceiverGroupDefaults(ReceiverGroupConfigFragment);

impl ReceiverGroupDefaults {
    /// The defaults compiled into the operator.
    pub fn builtin() -> Self {
        Self(ReceiverGroupConfigFragment {
            replicas: Some(1),
            image: Some(DEFAULT_IMAGE.to_string()),
            replication_factor: Some(1),
            retention: Some("15d".to_string()),
            storage_size: None,
            tenants: Some(Vec::new()),
            external_labels: Some(BTreeMap::new()),
            ports: ReceiverPortsFragment {
                grpc: Some(DEFAULT_GRPC_PORT),
                http: Some(DEFAULT_HTTP_PORT),
                remote_write: Some(DEFAULT_REMOTE_WRITE_PORT),
            },
            grpc_ingress: None,
            http_ingress: None,
        })
    }

    /// Layers the YAML fragment stored at `path` on top of the [builtin](Self::builtin) defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).context(ReadDefaultsSnafu { path })?;
        let fragment = serde_yaml::from_str::<ReceiverGroupConfigFragment>(&contents)
            .context(ParseDefaultsSnafu { path })?;
        Ok(Self::builtin().with_overrides(fragment))
    }

    /// Returns new defaults with `overrides` taking precedence over `self`.
    pub fn with_overrides(&self, overrides: ReceiverGroupConfigFragment) -> Self {
        Self(merge(overrides, &self.0))
    }

    pub fn as_fragment(&self) -> &ReceiverGroupConfigFragment {
        &self.0
    }
}

impl ReceiverGroup {
    /// Merges the group configuration with the `ThanosReceiver` level defaults and the operator
    /// defaults (in this order of precedence) and validates the result.
    ///
    /// Neither `self` nor any of the defaults is modified; the merge works on copies.
    pub fn merged_config(
        &self,
        receiver_defaults: &ReceiverGroupConfigFragment,
        operator_defaults: &ReceiverGroupDefaults,
    ) -> Result<ReceiverGroupConfig, ValidationError> {
        let name_validator = Validator::root();
        let name_validator = name_validator.field(&"name");
        if self.name.is_empty()
            || self.name.len() > GROUP_NAME_MAX_LEN
            || !GROUP_NAME_REGEX.is_match(&self.name)
        {
            return Err(name_validator.error_invalid(format!(
                "group name {name:?} must be a lowercase RFC 1123 label of at most {GROUP_NAME_MAX_LEN} characters",
                name = self.name
            )));
        }

        let mut group_config = self.config.clone();
        let mut receiver_config = receiver_defaults.clone();
        chainable_merge(&mut receiver_config, operator_defaults.as_fragment());
        chainable_merge(&mut group_config, &receiver_config);

        fragment::validate(group_config)
    }
}
