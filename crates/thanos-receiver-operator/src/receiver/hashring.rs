use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde::Serialize;
use snafu::ResultExt;

use super::{
    MergedReceiverGroup, ReceiverInstance, Result, SerializeHashringSnafu,
    args::HASHRING_FILE_NAME,
};

pub(super) const HASHRING_SUFFIX: &str = "hashring";

/// One entry of the Thanos hashrings file.
#[derive(Debug, Serialize)]
struct Hashring<'a> {
    hashring: &'a str,
    tenants: &'a [String],
    endpoints: Vec<String>,
}

/// The stable gRPC addresses of all receivers of `group`, one per StatefulSet ordinal.
fn endpoints(instance: &ReceiverInstance, group: &MergedReceiverGroup) -> Result<Vec<String>> {
    let name = instance.name(None);
    let namespace = instance.namespace()?;
    let cluster_domain = instance.cluster_domain();
    let port = group.config.ports.grpc;

    Ok((0..group.config.replicas)
        .map(|ordinal| format!("{name}-{ordinal}.{name}.{namespace}.svc.{cluster_domain}:{port}"))
        .collect())
}

pub(super) fn build_hashring(
    instance: &ReceiverInstance,
    group: &MergedReceiverGroup,
) -> Result<ConfigMap> {
    let hashrings = [Hashring {
        hashring: &group.name,
        tenants: &group.config.tenants,
        endpoints: endpoints(instance, group)?,
    }];
    let contents = serde_json::to_string_pretty(&hashrings)
        .context(SerializeHashringSnafu { group: &group.name })?;

    Ok(ConfigMap {
        metadata: instance.meta(Some(HASHRING_SUFFIX))?,
        data: Some(BTreeMap::from([(HASHRING_FILE_NAME.to_string(), contents)])),
        ..ConfigMap::default()
    })
}
