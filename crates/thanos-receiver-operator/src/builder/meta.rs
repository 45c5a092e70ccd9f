use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use snafu::{OptionExt, Snafu};

use crate::kvp::Labels;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("object is missing key {key:?}"))]
    MissingObjectKey { key: &'static str },
}

/// A builder to build [`ObjectMeta`] objects of resources owned by a single custom resource.
#[derive(Clone, Default)]
pub struct ObjectMetaBuilder {
    name: Option<String>,
    namespace: Option<String>,
    ownerreference: Option<OwnerReference>,
    labels: Labels,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace_opt(&mut self, namespace: impl Into<Option<String>>) -> &mut Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the only `OwnerReference` to point at `resource`.
    ///
    /// Fails if `resource` has not been stored by the API server yet, as it has no uid then.
    pub fn ownerreference_from_resource<T: Resource<DynamicType = ()>>(
        &mut self,
        resource: &T,
        controller: Option<bool>,
    ) -> Result<&mut Self> {
        self.ownerreference = Some(OwnerReference {
            api_version: T::api_version(&()).into_owned(),
            kind: T::kind(&()).into_owned(),
            name: resource.meta().name.clone().context(MissingObjectKeySnafu { key: "name" })?,
            uid: resource.uid().context(MissingObjectKeySnafu { key: "uid" })?,
            block_owner_deletion: None,
            controller,
        });
        Ok(self)
    }

    /// Adds `labels` to the existing labels. Labels with the same key are overwritten.
    pub fn with_labels(&mut self, labels: Labels) -> &mut Self {
        self.labels = std::mem::take(&mut self.labels).merge([&labels]);
        self
    }

    pub fn build(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            owner_references: self.ownerreference.clone().map(|owner| vec![owner]),
            labels: (!self.labels.is_empty()).then(|| self.labels.clone().into()),
            ..ObjectMeta::default()
        }
    }
}
