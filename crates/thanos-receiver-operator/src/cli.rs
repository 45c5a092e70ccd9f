//! Command line options of the operator binary.
use std::path::PathBuf;

use clap::Parser;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    Api, Resource,
    core::{ApiResource, DynamicObject},
};

#[derive(Debug, Parser)]
#[command(
    name = "thanos-receiver-operator",
    author,
    version,
    about = "Kubernetes operator for Thanos Receiver groups"
)]
pub struct Opts {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Parser)]
pub enum Command {
    /// Print CRD objects.
    Crd,

    /// Run the operator.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(long_about = "")]
pub struct RunArguments {
    /// Provides a specific namespace to watch (instead of watching all namespaces)
    #[arg(long, env, default_value = "")]
    pub watch_namespace: WatchNamespace,

    /// YAML file with receiver group defaults, layered over the built-in defaults
    #[arg(long, env, value_name = "FILE")]
    pub group_defaults: Option<PathBuf>,

    /// Kubernetes cluster domain, used in the DNS names of the receivers
    #[arg(long, env, default_value = "cluster.local")]
    pub kubernetes_cluster_domain: String,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum WatchNamespace {
    All,
    One(String),
}

impl From<&str> for WatchNamespace {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            WatchNamespace::All
        } else {
            WatchNamespace::One(s.to_string())
        }
    }
}

impl WatchNamespace {
    /// Gets an API object for the namespace in question or for all namespaces,
    /// depending on which variant we are.
    pub fn get_api<T>(&self, client: &kube::Client) -> Api<T>
    where
        T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match self {
            WatchNamespace::All => Api::all(client.clone()),
            WatchNamespace::One(namespace) => Api::namespaced(client.clone(), namespace),
        }
    }

    /// Like [`Self::get_api`], for a namespaced resource only known at runtime.
    pub fn get_dynamic_api(
        &self,
        client: &kube::Client,
        api_resource: &ApiResource,
    ) -> Api<DynamicObject> {
        match self {
            WatchNamespace::All => Api::all_with(client.clone(), api_resource),
            WatchNamespace::One(namespace) => {
                Api::namespaced_with(client.clone(), namespace, api_resource)
            }
        }
    }
}
