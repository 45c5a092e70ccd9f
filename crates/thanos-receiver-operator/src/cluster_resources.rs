//! Converges the cluster towards the resources described by a list of [`ResourceProducer`]s.
//!
//! Resources are processed one at a time, in the order of the producers. A resource that should
//! be [present](DesiredState::Present) is applied with server-side apply, so fields managed by the
//! API server or other field managers are preserved. A resource that should be
//! [absent](DesiredState::Absent) is deleted if it exists. The first failure stops the pass; the
//! controller retries the whole pass later.
use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, info};

use crate::receiver::{self, DesiredState, ResourceKind, ResourceProducer};

type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to produce {kind}"))]
    Produce {
        source: receiver::Error,
        kind: ResourceKind,
    },

    #[snafu(display("failed to convert {kind} {name:?}"))]
    Convert {
        source: receiver::Error,
        kind: ResourceKind,
        name: String,
    },

    #[snafu(display("{kind} {name:?} has no namespace"))]
    MissingNamespace { kind: ResourceKind, name: String },

    #[snafu(display("failed to get {kind} {name:?}"))]
    Get {
        source: BoxedError,
        kind: ResourceKind,
        name: String,
    },

    #[snafu(display("failed to apply {kind} {name:?}"))]
    Apply {
        source: BoxedError,
        kind: ResourceKind,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    Delete {
        source: BoxedError,
        kind: ResourceKind,
        name: String,
    },
}

impl Error {
    /// The name of the resource the error occurred for, if it got that far.
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            Error::Produce { .. } => None,
            Error::Convert { name, .. }
            | Error::MissingNamespace { name, .. }
            | Error::Get { name, .. }
            | Error::Apply { name, .. }
            | Error::Delete { name, .. } => Some(name),
        }
    }
}

/// Access to the live state of namespaced resources.
///
/// Implemented for [`crate::client::Client`]; tests use an in-memory store.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the live object, or `None` if it doesn't exist.
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Self::Error>;

    /// Creates or updates `object`, returning the object as stored by the server.
    async fn apply(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Self::Error>;

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), Self::Error>;
}

/// What happened to a single resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
}

/// Counts of what a convergence pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl ConvergenceReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Deleted => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.deleted
    }
}

impl Display for ConvergenceReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} deleted",
            self.created, self.updated, self.unchanged, self.deleted
        )
    }
}

/// Runs `producers` in order and converges each resource.
///
/// Stops at the first producer or store error; resources after it are left untouched.
pub async fn converge<S: ResourceStore>(
    store: &S,
    producers: &[ResourceProducer<'_>],
) -> Result<ConvergenceReport> {
    let mut report = ConvergenceReport::default();
    for producer in producers {
        let kind = producer.kind();
        let (resource, state) = producer.produce().context(ProduceSnafu { kind })?;
        let name = resource.name().to_string();
        let namespace = resource
            .namespace()
            .map(str::to_string)
            .context(MissingNamespaceSnafu { kind, name: &name })?;
        let api_resource = resource.api_resource();

        let live = store
            .get(&api_resource, &namespace, &name)
            .await
            .map_err(BoxedError::from)
            .context(GetSnafu { kind, name: &name })?;

        let outcome = match (state, live) {
            (DesiredState::Present, live) => {
                let object = resource
                    .to_dynamic()
                    .context(ConvertSnafu { kind, name: &name })?;
                let applied = store
                    .apply(&api_resource, &namespace, &object)
                    .await
                    .map_err(BoxedError::from)
                    .context(ApplySnafu { kind, name: &name })?;
                match live {
                    None => Outcome::Created,
                    Some(live)
                        if live.metadata.resource_version == applied.metadata.resource_version =>
                    {
                        Outcome::Unchanged
                    }
                    Some(_) => Outcome::Updated,
                }
            }
            (DesiredState::Absent, Some(_)) => {
                store
                    .delete(&api_resource, &namespace, &name)
                    .await
                    .map_err(BoxedError::from)
                    .context(DeleteSnafu { kind, name: &name })?;
                Outcome::Deleted
            }
            (DesiredState::Absent, None) => {
                debug!(%kind, name = %name, "resource is absent already");
                Outcome::Unchanged
            }
        };

        if outcome != Outcome::Unchanged {
            info!(%kind, name = %name, namespace = %namespace, %outcome, "converged resource");
        }
        report.record(outcome);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Mutex};

    use indoc::indoc;
    use snafu::Snafu;

    use super::*;
    use crate::{
        crd::ReceiverGroupDefaults,
        receiver::{
            ReceiverInstance, resource_factory,
            tests::{CLUSTER_DOMAIN, receiver, two_groups},
        },
    };

    type Key = (String, String, String);

    #[derive(Debug, Snafu)]
    #[snafu(display("injected failure"))]
    struct InjectedFailure;

    /// Keeps objects in memory and bumps the resource version on every write that changes them.
    #[derive(Default)]
    struct InMemoryStore {
        objects: Mutex<BTreeMap<Key, DynamicObject>>,
        next_version: Mutex<u64>,
        fail_on: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl InMemoryStore {
        fn failing_on(name: &str) -> Self {
            Self {
                fail_on: Some(name.to_string()),
                ..Self::default()
            }
        }

        fn key(resource: &ApiResource, namespace: &str, name: &str) -> Key {
            (resource.kind.clone(), namespace.to_string(), name.to_string())
        }

        fn insert(&self, resource: &ApiResource, namespace: &str, object: DynamicObject) {
            let name = object.metadata.name.clone().unwrap();
            self.objects
                .lock()
                .unwrap()
                .insert(Self::key(resource, namespace, &name), object);
        }

        fn contains(&self, kind: &str, name: &str) -> bool {
            self.objects
                .lock()
                .unwrap()
                .keys()
                .any(|(k, _, n)| k == kind && n == name)
        }

        fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, call: &str, name: &str) -> Result<(), InjectedFailure> {
            self.calls.lock().unwrap().push(format!("{call} {name}"));
            match &self.fail_on {
                Some(fail_on) if fail_on == name => InjectedFailureSnafu.fail(),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ResourceStore for InMemoryStore {
        type Error = InjectedFailure;

        async fn get(
            &self,
            resource: &ApiResource,
            namespace: &str,
            name: &str,
        ) -> Result<Option<DynamicObject>, Self::Error> {
            self.check("get", name)?;
            Ok(self
                .objects
                .lock()
                .unwrap()
                .get(&Self::key(resource, namespace, name))
                .cloned())
        }

        async fn apply(
            &self,
            resource: &ApiResource,
            namespace: &str,
            object: &DynamicObject,
        ) -> Result<DynamicObject, Self::Error> {
            let name = object.metadata.name.clone().unwrap_or_default();
            self.check("apply", &name)?;

            let key = Self::key(resource, namespace, &name);
            let mut objects = self.objects.lock().unwrap();
            let mut stored = object.clone();
            match objects.get(&key) {
                Some(live)
                    if live.data == object.data && live.metadata.labels == object.metadata.labels =>
                {
                    stored.metadata.resource_version = live.metadata.resource_version.clone();
                    stored.metadata.uid = live.metadata.uid.clone();
                }
                live => {
                    let mut version = self.next_version.lock().unwrap();
                    *version += 1;
                    stored.metadata.resource_version = Some(version.to_string());
                    stored.metadata.uid = live
                        .and_then(|live| live.metadata.uid.clone())
                        .or_else(|| Some(format!("uid-{name}")));
                }
            }
            objects.insert(key, stored.clone());
            Ok(stored)
        }

        async fn delete(
            &self,
            resource: &ApiResource,
            namespace: &str,
            name: &str,
        ) -> Result<(), Self::Error> {
            self.check("delete", name)?;
            self.objects
                .lock()
                .unwrap()
                .remove(&Self::key(resource, namespace, name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn first_pass_creates_everything_present() {
        let receiver = two_groups();
        let producers =
            resource_factory(&receiver, &ReceiverGroupDefaults::builtin(), CLUSTER_DOMAIN)
                .unwrap();
        let store = InMemoryStore::default();

        let report = converge(&store, &producers).await.unwrap();

        // Each group configures one of its two ingresses
        assert_eq!(report, ConvergenceReport {
            created: 11,
            updated: 0,
            unchanged: 2,
            deleted: 0,
        });
        assert_eq!(report.total(), producers.len());
        assert_eq!(store.len(), 11);
        assert!(store.contains("Ingress", "metrics-receiver-tenant-a-grpc"));
        assert!(!store.contains("Ingress", "metrics-receiver-tenant-a-http"));
    }

    #[tokio::test]
    async fn second_pass_is_unchanged() {
        let receiver = two_groups();
        let producers =
            resource_factory(&receiver, &ReceiverGroupDefaults::builtin(), CLUSTER_DOMAIN)
                .unwrap();
        let store = InMemoryStore::default();

        converge(&store, &producers).await.unwrap();
        let report = converge(&store, &producers).await.unwrap();

        assert_eq!(report.unchanged, producers.len());
        assert_eq!(report.total(), report.unchanged);
    }

    #[tokio::test]
    async fn changed_group_is_updated() {
        let mut receiver = two_groups();
        let defaults = ReceiverGroupDefaults::builtin();
        let store = InMemoryStore::default();
        converge(
            &store,
            &resource_factory(&receiver, &defaults, CLUSTER_DOMAIN).unwrap(),
        )
        .await
        .unwrap();

        receiver.spec.receiver_groups[1].config.replicas = Some(4);
        let report = converge(
            &store,
            &resource_factory(&receiver, &defaults, CLUSTER_DOMAIN).unwrap(),
        )
        .await
        .unwrap();

        // The StatefulSet and the hashring of the group change
        assert_eq!(report.updated, 2);
        assert_eq!(report.created, 0);
    }

    #[tokio::test]
    async fn removed_ingress_is_deleted() {
        let mut receiver = two_groups();
        let defaults = ReceiverGroupDefaults::builtin();
        let store = InMemoryStore::default();
        converge(
            &store,
            &resource_factory(&receiver, &defaults, CLUSTER_DOMAIN).unwrap(),
        )
        .await
        .unwrap();
        assert!(store.contains("Ingress", "metrics-receiver-tenant-a-grpc"));

        receiver.spec.receiver_groups[0].config.grpc_ingress = None;
        let report = converge(
            &store,
            &resource_factory(&receiver, &defaults, CLUSTER_DOMAIN).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(!store.contains("Ingress", "metrics-receiver-tenant-a-grpc"));
    }

    #[tokio::test]
    async fn zero_groups_converge_common_service() {
        let receiver = receiver(indoc! {"
            apiVersion: receiver.thanos.io/v1alpha1
            kind: ThanosReceiver
            metadata:
              name: metrics
              namespace: monitoring
            spec: {}
        "});
        let producers =
            resource_factory(&receiver, &ReceiverGroupDefaults::builtin(), CLUSTER_DOMAIN)
                .unwrap();
        let store = InMemoryStore::default();

        let report = converge(&store, &producers).await.unwrap();

        assert_eq!(report.created, 1);
        assert!(store.contains("Service", "metrics-receiver"));
    }

    #[tokio::test]
    async fn store_failure_stops_the_pass() {
        let receiver = two_groups();
        let producers =
            resource_factory(&receiver, &ReceiverGroupDefaults::builtin(), CLUSTER_DOMAIN)
                .unwrap();
        let store = InMemoryStore::failing_on("metrics-receiver-tenant-a-hashring");

        let err = converge(&store, &producers).await.unwrap_err();

        assert!(matches!(err, Error::Get {
            kind: ResourceKind::Hashring,
            ..
        }));
        assert_eq!(err.resource_name(), Some("metrics-receiver-tenant-a-hashring"));
        assert_eq!(store.calls(), [
            "get metrics-receiver",
            "apply metrics-receiver",
            "get metrics-receiver-tenant-a",
            "apply metrics-receiver-tenant-a",
            "get metrics-receiver-tenant-a-hashring",
        ]);
    }

    #[tokio::test]
    async fn producer_failure_stops_the_pass() {
        let receiver = two_groups();
        let common = ReceiverInstance::new(&receiver, CLUSTER_DOMAIN);
        let producers = [
            ResourceProducer::new(ResourceKind::CommonService, common.clone()),
            // Group resources can't be built without a group
            ResourceProducer::new(ResourceKind::StatefulSet, common.clone()),
            ResourceProducer::new(ResourceKind::CommonService, common),
        ];
        let store = InMemoryStore::default();

        let err = converge(&store, &producers).await.unwrap_err();

        assert!(matches!(err, Error::Produce {
            kind: ResourceKind::StatefulSet,
            ..
        }));
        assert_eq!(err.resource_name(), None);
        assert_eq!(store.calls(), ["get metrics-receiver", "apply metrics-receiver"]);
    }

    #[tokio::test]
    async fn resources_without_namespace_are_rejected() {
        let mut receiver = two_groups();
        receiver.metadata.namespace = None;
        let producers =
            resource_factory(&receiver, &ReceiverGroupDefaults::builtin(), CLUSTER_DOMAIN)
                .unwrap();
        let store = InMemoryStore::default();

        let err = converge(&store, &producers).await.unwrap_err();

        assert!(matches!(err, Error::MissingNamespace {
            kind: ResourceKind::CommonService,
            ..
        }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn unrelated_objects_are_not_touched() {
        let receiver = two_groups();
        let producers =
            resource_factory(&receiver, &ReceiverGroupDefaults::builtin(), CLUSTER_DOMAIN)
                .unwrap();
        let store = InMemoryStore::default();

        let (unrelated, _) = producers[0].produce().unwrap();
        let mut object = unrelated.to_dynamic().unwrap();
        object.metadata.name = Some("unrelated".to_string());
        store.insert(&unrelated.api_resource(), "monitoring", object);

        converge(&store, &producers).await.unwrap();

        assert!(store.contains("Service", "unrelated"));
    }
}
