use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};

use super::{DesiredState, MergedReceiverGroup, ReceiverInstance, Result};
use crate::crd::{GRPC_PORT_NAME, IngressConfig, REMOTE_WRITE_PORT_NAME};

const GRPC_INGRESS_SUFFIX: &str = "grpc";
const HTTP_INGRESS_SUFFIX: &str = "http";

/// Exposes the gRPC store API of a group.
pub(super) fn build_grpc_ingress(
    instance: &ReceiverInstance,
    group: &MergedReceiverGroup,
) -> Result<(Ingress, DesiredState)> {
    build_ingress(
        instance,
        group.config.grpc_ingress.as_ref(),
        GRPC_INGRESS_SUFFIX,
        GRPC_PORT_NAME,
    )
}

/// Exposes the remote-write endpoint of a group.
pub(super) fn build_http_ingress(
    instance: &ReceiverInstance,
    group: &MergedReceiverGroup,
) -> Result<(Ingress, DesiredState)> {
    build_ingress(
        instance,
        group.config.http_ingress.as_ref(),
        HTTP_INGRESS_SUFFIX,
        REMOTE_WRITE_PORT_NAME,
    )
}

/// An unconfigured ingress only carries its identity, which is all that is needed to remove it.
fn build_ingress(
    instance: &ReceiverInstance,
    config: Option<&IngressConfig>,
    suffix: &str,
    port_name: &str,
) -> Result<(Ingress, DesiredState)> {
    let metadata = instance.meta(Some(suffix))?;
    let Some(config) = config else {
        return Ok((
            Ingress {
                metadata,
                ..Ingress::default()
            },
            DesiredState::Absent,
        ));
    };

    let tls = (!config.certificate.is_empty()).then(|| {
        vec![IngressTLS {
            hosts: Some(vec![config.host.clone()]),
            secret_name: Some(config.certificate.clone()),
        }]
    });

    let ingress = Ingress {
        metadata,
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(config.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(config.path.clone()),
                        path_type: "ImplementationSpecific".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: instance.name(None),
                                port: Some(ServiceBackendPort {
                                    name: Some(port_name.to_string()),
                                    number: None,
                                }),
                            }),
                            ..IngressBackend::default()
                        },
                    }],
                }),
            }]),
            tls,
            ..IngressSpec::default()
        }),
        ..Ingress::default()
    };

    Ok((ingress, DesiredState::Present))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        crd::ReceiverGroupDefaults,
        receiver::tests::{CLUSTER_DOMAIN, two_groups},
    };

    fn merged_group(receiver: &crate::crd::ThanosReceiver, index: usize) -> MergedReceiverGroup {
        let group = &receiver.spec.receiver_groups[index];
        MergedReceiverGroup {
            name: group.name.clone(),
            config: group
                .merged_config(&receiver.spec.defaults, &ReceiverGroupDefaults::builtin())
                .unwrap(),
        }
    }

    #[test]
    fn http_ingress_routes_to_remote_write() {
        let receiver = two_groups();
        let group = Arc::new(merged_group(&receiver, 1));
        let instance = ReceiverInstance::new(&receiver, CLUSTER_DOMAIN).for_group(group.clone());

        let (ingress, state) = build_http_ingress(&instance, &group).unwrap();
        assert_eq!(state, DesiredState::Present);
        assert_eq!(
            ingress.metadata.name.as_deref(),
            Some("metrics-receiver-default-http")
        );

        let spec = ingress.spec.unwrap();
        assert_eq!(spec.tls, None);

        let rules = spec.rules.unwrap();
        let rule = &rules[0];
        assert_eq!(rule.host.as_deref(), Some("write.example.com"));
        let path = &rule.http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/api/v1/receive"));

        let backend = path.backend.service.as_ref().unwrap();
        assert_eq!(backend.name, "metrics-receiver-default");
        assert_eq!(
            backend.port.as_ref().unwrap().name.as_deref(),
            Some("remote-write")
        );
    }

    #[test]
    fn unconfigured_ingress_is_absent() {
        let receiver = two_groups();
        let group = Arc::new(merged_group(&receiver, 1));
        let instance = ReceiverInstance::new(&receiver, CLUSTER_DOMAIN).for_group(group.clone());

        let (ingress, state) = build_grpc_ingress(&instance, &group).unwrap();
        assert_eq!(state, DesiredState::Absent);
        assert_eq!(
            ingress.metadata.name.as_deref(),
            Some("metrics-receiver-default-grpc")
        );
        assert_eq!(ingress.spec, None);
    }
}
