use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::util::intstr::IntOrString,
};

use super::{MergedReceiverGroup, ReceiverInstance, Result};
use crate::crd::{
    DEFAULT_GRPC_PORT, DEFAULT_HTTP_PORT, DEFAULT_REMOTE_WRITE_PORT, GRPC_PORT_NAME,
    HTTP_PORT_NAME, REMOTE_WRITE_PORT_NAME,
};

/// The Service in front of the receivers of all groups.
///
/// Target ports are referenced by name, so groups listening on non-default ports are still
/// reachable through the default ports.
pub(super) fn build_common_service(instance: &ReceiverInstance) -> Result<Service> {
    Ok(Service {
        metadata: instance.meta(None)?,
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from(instance.labels()?)),
            ports: Some(vec![
                service_port(GRPC_PORT_NAME, DEFAULT_GRPC_PORT),
                service_port(HTTP_PORT_NAME, DEFAULT_HTTP_PORT),
                service_port(REMOTE_WRITE_PORT_NAME, DEFAULT_REMOTE_WRITE_PORT),
            ]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    })
}

/// The headless Service governing the StatefulSet of a group. It provides the stable per-pod DNS
/// names used by the hashring.
pub(super) fn build_group_service(
    instance: &ReceiverInstance,
    group: &MergedReceiverGroup,
) -> Result<Service> {
    let ports = &group.config.ports;
    Ok(Service {
        metadata: instance.meta(None)?,
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(BTreeMap::from(instance.labels()?)),
            ports: Some(vec![
                service_port(GRPC_PORT_NAME, ports.grpc),
                service_port(HTTP_PORT_NAME, ports.http),
                service_port(REMOTE_WRITE_PORT_NAME, ports.remote_write),
            ]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    })
}

fn service_port(name: &str, port: u16) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port: i32::from(port),
        target_port: Some(IntOrString::String(name.to_string())),
        protocol: Some("TCP".to_string()),
        ..ServicePort::default()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        crd::ReceiverGroupDefaults,
        kvp::consts::RECEIVER_GROUP_KEY,
        receiver::{
            DesiredResource, ResourceKind, resource_factory,
            tests::{CLUSTER_DOMAIN, two_groups},
        },
    };

    fn service(kind: ResourceKind) -> Service {
        let receiver = two_groups();
        let producers =
            resource_factory(&receiver, &ReceiverGroupDefaults::builtin(), CLUSTER_DOMAIN)
                .unwrap();
        let producer = producers
            .iter()
            .find(|producer| producer.kind() == kind)
            .unwrap();
        match producer.produce().unwrap() {
            (DesiredResource::Service(service), _) => service,
            other => panic!("unexpected resource {other:?}"),
        }
    }

    #[rstest]
    #[case(ResourceKind::CommonService, None)]
    #[case(ResourceKind::GroupService, Some("None"))]
    fn service_ports(#[case] kind: ResourceKind, #[case] cluster_ip: Option<&str>) {
        let spec = service(kind).spec.unwrap();

        assert_eq!(spec.cluster_ip.as_deref(), cluster_ip);
        let ports = spec
            .ports
            .unwrap()
            .into_iter()
            .map(|port| (port.name.unwrap(), port.port))
            .collect::<Vec<_>>();
        assert_eq!(ports, [
            ("grpc".to_string(), 10901),
            ("http".to_string(), 10902),
            ("remote-write".to_string(), 19291),
        ]);
    }

    #[test]
    fn common_service_selects_all_groups() {
        let selector = service(ResourceKind::CommonService)
            .spec
            .unwrap()
            .selector
            .unwrap();
        assert!(!selector.contains_key(RECEIVER_GROUP_KEY));

        let selector = service(ResourceKind::GroupService)
            .spec
            .unwrap()
            .selector
            .unwrap();
        assert_eq!(selector[RECEIVER_GROUP_KEY], "tenant-a");
    }
}
