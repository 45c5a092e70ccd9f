use const_format::concatcp;

/// The well-known Kubernetes app key prefix.
const K8S_APP_KEY_PREFIX: &str = "app.kubernetes.io/";

/// The operator-specific key prefix.
const RECEIVER_KEY_PREFIX: &str = "receiver.thanos.io/";

/// The well-known Kubernetes app name key `app.kubernetes.io/name`. Every resource created by the
/// operator carries it with the role of the resource as value, e.g. `receiver`.
pub const K8S_APP_NAME_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "name");

/// The well-known Kubernetes app instance key `app.kubernetes.io/instance`, set to the name of the
/// owning `ThanosReceiver`.
pub const K8S_APP_INSTANCE_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "instance");

/// The well-known Kubernetes app managed-by key `app.kubernetes.io/managed-by`.
pub const K8S_APP_MANAGED_BY_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "managed-by");

/// Identifies the receiver group a resource belongs to. Group-less resources don't carry it.
pub const RECEIVER_GROUP_KEY: &str = concatcp!(RECEIVER_KEY_PREFIX, "group");
