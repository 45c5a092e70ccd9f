//! Log setup and reporting of controller outcomes.
use std::path::PathBuf;

use kube::{
    Resource,
    runtime::{
        controller::{self, Action},
        reflector::ObjectRef,
    },
};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global `tracing` subscriber.
///
/// The filter is read from the environment variable `env`, e.g. `THANOS_RECEIVER_OPERATOR_LOG`,
/// and falls back to INFO. If `{env}_DIRECTORY` is set, events are also written to an hourly
/// rotated `{app_name}.log` in that directory.
pub fn initialize_logging(env: &str, app_name: &str) {
    let filter = EnvFilter::try_from_env(env)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let log_dir = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_layer = log_dir.as_deref().map(|dir| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(RollingFileAppender::new(
                Rotation::HOURLY,
                dir,
                format!("{app_name}.log"),
            ))
    });

    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    if let Some(dir) = log_dir {
        tracing::info!(directory = %dir.display(), "writing logs to files");
    }
}

/// [`std::error::Error`] extensions that help report reconciliation errors.
pub trait ReconcilerError: std::error::Error {
    /// `PascalCase`d name for the error category, typically from [`strum::IntoStaticStr`].
    fn category(&self) -> &'static str;

    /// Name of the owned object the error happened for, if any.
    fn secondary_object(&self) -> Option<&str> {
        None
    }
}

/// Reports the outcome of a single reconciliation to the current [`tracing::Subscriber`].
pub fn report_controller_reconciled<K, ReconcileErr, QueueErr>(
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<ReconcileErr, QueueErr>>,
) where
    K: Resource,
    ReconcileErr: ReconcilerError + 'static,
    QueueErr: std::error::Error + 'static,
{
    match result {
        Ok((obj, _)) => {
            tracing::info!(
                controller.name = controller_name,
                object = %obj,
                "Reconciled object"
            );
        }
        Err(controller::Error::ReconcilerFailed(error, obj)) => {
            tracing::error!(
                controller.name = controller_name,
                object = %obj,
                error.category = error.category(),
                error.object = error.secondary_object(),
                error = error as &dyn std::error::Error,
                "Failed to reconcile object",
            );
        }
        Err(error) => {
            tracing::error!(
                controller.name = controller_name,
                error = error as &dyn std::error::Error,
                "Failed to reconcile object",
            );
        }
    }
}
