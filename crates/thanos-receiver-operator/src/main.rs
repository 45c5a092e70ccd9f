use std::sync::Arc;

use clap::Parser;
use kube::CustomResourceExt;
use snafu::{ResultExt, Snafu};
use thanos_receiver_operator::{
    cli::{Command, Opts, RunArguments},
    client,
    controller::{self, Ctx},
    crd::{self, FIELD_MANAGER_SCOPE, ReceiverGroupDefaults, ThanosReceiver},
    logging,
};
use tracing::info;

const APP_NAME: &str = "thanos-receiver-operator";
const LOG_ENV: &str = "THANOS_RECEIVER_OPERATOR_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to serialize CRD"))]
    SerializeCrd { source: serde_yaml::Error },

    #[snafu(display("failed to load receiver group defaults"))]
    LoadDefaults { source: crd::Error },

    #[snafu(display("failed to initialize kubernetes client"))]
    InitializeClient { source: client::Error },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    match opts.command {
        Command::Crd => {
            let crd = serde_yaml::to_string(&ThanosReceiver::crd()).context(SerializeCrdSnafu)?;
            print!("{crd}");
        }
        Command::Run(RunArguments {
            watch_namespace,
            group_defaults,
            kubernetes_cluster_domain,
        }) => {
            logging::initialize_logging(LOG_ENV, APP_NAME);
            info!(
                version = env!("CARGO_PKG_VERSION"),
                ?watch_namespace,
                cluster_domain = %kubernetes_cluster_domain,
                "starting {APP_NAME}"
            );

            let defaults = match group_defaults {
                Some(path) => {
                    info!(path = %path.display(), "loading receiver group defaults");
                    ReceiverGroupDefaults::load(&path).context(LoadDefaultsSnafu)?
                }
                None => ReceiverGroupDefaults::builtin(),
            };

            let client = client::initialize_operator(FIELD_MANAGER_SCOPE)
                .await
                .context(InitializeClientSnafu)?;

            controller::run(&watch_namespace, Ctx {
                client,
                defaults: Arc::new(defaults),
                cluster_domain: kubernetes_cluster_domain,
            })
            .await;
        }
    }

    Ok(())
}
