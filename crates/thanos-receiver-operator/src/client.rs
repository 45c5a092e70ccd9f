use async_trait::async_trait;
use kube::{
    Api,
    api::{DeleteParams, Patch, PatchParams},
    core::{ApiResource, DynamicObject},
};
use snafu::{ResultExt, Snafu};
use tracing::trace;

use crate::{cluster_resources::ResourceStore, crd::OPERATOR_NAME};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create kubernetes client"))]
    CreateKubeClient { source: kube::Error },
}

/// This `Client` can be used to access Kubernetes.
/// It wraps an underlying [`kube::Client`] and applies every object with the same field manager.
#[derive(Clone)]
pub struct Client {
    client: kube::Client,
    apply_patch_params: PatchParams,
    delete_params: DeleteParams,
}

impl Client {
    pub fn new(client: kube::Client, field_manager: &str) -> Self {
        Client {
            client,
            apply_patch_params: PatchParams::apply(field_manager).force(),
            delete_params: DeleteParams::default(),
        }
    }

    /// Returns a [`kube::Client`] that can be freely used.
    pub fn as_kube_client(&self) -> kube::Client {
        self.client.clone()
    }

    fn dynamic_api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

#[async_trait]
impl ResourceStore for Client {
    type Error = kube::Error;

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Self::Error> {
        self.dynamic_api(resource, namespace).get_opt(name).await
    }

    /// Uses server-side apply, which creates missing objects and keeps fields owned by other
    /// managers on existing ones.
    async fn apply(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Self::Error> {
        let name = object.metadata.name.as_deref().unwrap_or_default();
        trace!(kind = %resource.kind, name, namespace, "applying object");
        self.dynamic_api(resource, namespace)
            .patch(name, &self.apply_patch_params, &Patch::Apply(object))
            .await
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), Self::Error> {
        match self
            .dynamic_api(resource, namespace)
            .delete(name, &self.delete_params)
            .await
        {
            Ok(_) => Ok(()),
            // Somebody else was faster
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Creates a [`Client`] from the ambient configuration (in-cluster or kubeconfig).
pub async fn initialize_operator(field_manager_scope: &str) -> Result<Client, Error> {
    let client = kube::Client::try_default()
        .await
        .context(CreateKubeClientSnafu)?;
    Ok(Client::new(
        client,
        &format!("{OPERATOR_NAME}_{field_manager_scope}"),
    ))
}
