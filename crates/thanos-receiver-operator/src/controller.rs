//! Reconciles [`ThanosReceiver`] objects.
use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{ConfigMap, Service},
    networking::v1::Ingress,
};
use kube::{
    core::ApiResource,
    runtime::{Controller, controller::Action, watcher},
};
use snafu::{ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};
use tracing::info;

use crate::{
    cli::WatchNamespace,
    client::Client,
    cluster_resources::{self, converge},
    crd::{ReceiverGroupDefaults, ThanosReceiver, service_monitor::ServiceMonitor},
    logging::{ReconcilerError, report_controller_reconciled},
    receiver::{self, resource_factory},
};

pub const CONTROLLER_NAME: &str = "thanosreceiver";

const REQUEUE_AFTER: Duration = Duration::from_secs(10);

/// Shared, read-only state of all reconciliations.
pub struct Ctx {
    pub client: Client,
    pub defaults: Arc<ReceiverGroupDefaults>,
    pub cluster_domain: String,
}

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to build the resources of the receiver"))]
    BuildResources { source: receiver::Error },

    #[snafu(display("failed to converge the resources of the receiver"))]
    ConvergeResources { source: cluster_resources::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }

    fn secondary_object(&self) -> Option<&str> {
        match self {
            Error::BuildResources { .. } => None,
            Error::ConvergeResources { source } => source.resource_name(),
        }
    }
}

pub async fn reconcile(receiver: Arc<ThanosReceiver>, ctx: Arc<Ctx>) -> Result<Action> {
    info!("starting reconcile");

    let producers = resource_factory(&receiver, &ctx.defaults, &ctx.cluster_domain)
        .context(BuildResourcesSnafu)?;
    let report = converge(&ctx.client, &producers)
        .await
        .context(ConvergeResourcesSnafu)?;

    info!(%report, "receiver converged");
    Ok(Action::await_change())
}

/// The kinds of objects a `ThanosReceiver` owns. Changes to any of them trigger a reconcile of
/// the owner.
pub fn owned_resources() -> [ApiResource; 5] {
    [
        ApiResource::erase::<StatefulSet>(&()),
        ApiResource::erase::<Service>(&()),
        ApiResource::erase::<ConfigMap>(&()),
        ApiResource::erase::<ServiceMonitor>(&()),
        ApiResource::erase::<Ingress>(&()),
    ]
}

/// Retries the whole pass after a fixed delay.
pub fn error_policy(_obj: Arc<ThanosReceiver>, _error: &Error, _ctx: Arc<Ctx>) -> Action {
    Action::requeue(REQUEUE_AFTER)
}

/// Runs the controller until the process receives a shutdown signal.
pub async fn run(watch_namespace: &WatchNamespace, ctx: Ctx) {
    let kube_client = ctx.client.as_kube_client();

    let controller = owned_resources().into_iter().fold(
        Controller::new(
            watch_namespace.get_api::<ThanosReceiver>(&kube_client),
            watcher::Config::default(),
        ),
        |controller, api_resource| {
            controller.owns_with(
                watch_namespace.get_dynamic_api(&kube_client, &api_resource),
                api_resource,
                watcher::Config::default(),
            )
        },
    );

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .for_each(|result| async move {
            report_controller_reconciled(CONTROLLER_NAME, &result);
        })
        .await;
}
