//! Command line arguments of the `thanos receive` container.
use snafu::ResultExt;

use super::{MergedReceiverGroup, QuoteLabelValueSnafu, ReceiverInstance, Result};

pub const DATA_DIR: &str = "/var/thanos/receive";
pub const HASHRING_DIR: &str = "/etc/thanos";
pub const HASHRING_FILE_NAME: &str = "hashrings.json";

/// Environment variable holding the name of the receiver pod, resolved by the kubelet.
pub const POD_NAME_ENV: &str = "POD_NAME";

const BASE_ARGS: &[&str] = &["receive"];

/// Builds the arguments for the receivers of `group`.
///
/// The result only depends on its inputs. External labels are emitted in key order, with their
/// values quoted and escaped.
pub fn receiver_args(
    instance: &ReceiverInstance,
    group: &MergedReceiverGroup,
) -> Result<Vec<String>> {
    let config = &group.config;
    let ports = &config.ports;

    let mut args = BASE_ARGS
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    args.extend([
        format!("--grpc-address=0.0.0.0:{}", ports.grpc),
        format!("--http-address=0.0.0.0:{}", ports.http),
        format!("--remote-write.address=0.0.0.0:{}", ports.remote_write),
        format!("--tsdb.path={DATA_DIR}"),
        format!("--tsdb.retention={}", config.retention),
        format!("--receive.replication-factor={}", config.replication_factor),
        format!("--receive.hashrings-file={HASHRING_DIR}/{HASHRING_FILE_NAME}"),
        format!("--label=receive_replica=\"$({POD_NAME_ENV})\""),
    ]);
    for (key, value) in &config.external_labels {
        let value = serde_json::to_string(value).context(QuoteLabelValueSnafu { key })?;
        args.push(format!("--label={key}={value}"));
    }
    args.push(format!(
        "--receive.local-endpoint=$({POD_NAME_ENV}).{service}.{namespace}.svc.{cluster_domain}:{port}",
        service = instance.name(None),
        namespace = instance.namespace()?,
        cluster_domain = instance.cluster_domain(),
        port = ports.grpc,
    ));

    Ok(args)
}
