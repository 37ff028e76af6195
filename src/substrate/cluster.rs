use super::{Substrate, SubstrateError, SubstrateResource};
use async_trait::async_trait;
use either::Either::{Left, Right};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client as KubeClient, Error as KubeError, ResourceExt,
};

/// Substrate backed by a Kubernetes API server.
#[derive(Clone)]
pub struct KubeSubstrate {
    client: KubeClient,
    namespace: String,
}

impl KubeSubstrate {
    pub fn new(client: KubeClient, namespace: String) -> Self {
        Self { client, namespace }
    }

    /// Connects with in-cluster config or the local kubeconfig.
    pub async fn try_default(namespace: String) -> Result<Self, KubeError> {
        let client = KubeClient::try_default().await?;
        Ok(Self::new(client, namespace))
    }

    fn api<K: SubstrateResource>(&self) -> Api<K> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

fn convert_error<K: SubstrateResource>(error: KubeError, name: &str) -> SubstrateError {
    match error {
        KubeError::Api(ref response) if response.code == 404 => {
            SubstrateError::not_found::<K>(name)
        }
        KubeError::Api(ref response) if response.code == 409 => {
            SubstrateError::already_exists::<K>(name)
        }
        error => SubstrateError::Kube(error),
    }
}

#[async_trait]
impl Substrate for KubeSubstrate {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create<K: SubstrateResource>(&self, resource: &K) -> Result<K, SubstrateError> {
        self.api::<K>()
            .create(&PostParams::default(), resource)
            .await
            .map_err(|error| convert_error::<K>(error, &resource.name_any()))
    }

    async fn get_opt<K: SubstrateResource>(&self, name: &str) -> Result<Option<K>, SubstrateError> {
        self.api::<K>()
            .get_opt(name)
            .await
            .map_err(|error| convert_error::<K>(error, name))
    }

    async fn replace<K: SubstrateResource>(
        &self,
        name: &str,
        resource: &K,
    ) -> Result<K, SubstrateError> {
        self.api::<K>()
            .replace(name, &PostParams::default(), resource)
            .await
            .map_err(|error| convert_error::<K>(error, name))
    }

    async fn delete<K: SubstrateResource>(&self, name: &str) -> Result<(), SubstrateError> {
        let kind = K::kind_name();

        match self
            .api::<K>()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|error| convert_error::<K>(error, name))?
        {
            Left(_) => tracing::debug!(%kind, %name, "Deletion started."),
            Right(_) => tracing::debug!(%kind, %name, "Deleted."),
        }

        Ok(())
    }

    async fn list<K: SubstrateResource>(
        &self,
        label_selector: &str,
    ) -> Result<Vec<K>, SubstrateError> {
        self.api::<K>()
            .list(&ListParams::default().labels(label_selector))
            .await
            .map(|list| list.items)
            .map_err(SubstrateError::Kube)
    }

    async fn ping(&self) -> Result<(), SubstrateError> {
        let namespace_api: Api<Namespace> = Api::all(self.client.clone());

        match namespace_api.get_opt(&self.namespace).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SubstrateError::NotFound {
                kind: String::from("Namespace"),
                name: self.namespace.clone(),
            }),
            Err(error) => Err(SubstrateError::Kube(error)),
        }
    }
}
