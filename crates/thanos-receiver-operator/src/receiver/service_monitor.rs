use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::{ReceiverInstance, Result};
use crate::crd::{
    HTTP_PORT_NAME,
    service_monitor::{Endpoint, NamespaceSelector, ServiceMonitor, ServiceMonitorSpec},
};

/// Scrapes the metrics endpoint of every receiver of a group.
pub(super) fn build_service_monitor(instance: &ReceiverInstance) -> Result<ServiceMonitor> {
    let spec = ServiceMonitorSpec {
        selector: LabelSelector {
            match_labels: Some(instance.labels()?.into()),
            ..LabelSelector::default()
        },
        endpoints: vec![Endpoint {
            port: HTTP_PORT_NAME.to_string(),
            path: Some("/metrics".to_string()),
            interval: None,
        }],
        namespace_selector: Some(NamespaceSelector {
            match_names: vec![instance.namespace()?],
        }),
    };

    let mut service_monitor = ServiceMonitor::new(&instance.name(None), spec);
    service_monitor.metadata = instance.meta(None)?;
    Ok(service_monitor)
}
