//! Materializes `ThanosReceiver` custom resources into the Kubernetes resources of a Thanos
//! Receiver fan-in tier and converges the cluster towards them.

pub mod builder;
pub mod cli;
pub mod client;
pub mod cluster_resources;
pub mod config;
pub mod controller;
pub mod crd;
pub mod kvp;
pub mod logging;
pub mod receiver;

// External re-exports
pub use k8s_openapi;
pub use kube;
pub use schemars;
