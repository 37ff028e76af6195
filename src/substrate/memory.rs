use super::{Operation, Substrate, SubstrateError, SubstrateResource};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::{
    api::apps::v1::{Deployment, DeploymentStatus},
    apimachinery::pkg::apis::meta::v1::Time,
};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

type ObjectKey = (String, String);

#[derive(Default)]
struct Store {
    objects: BTreeMap<ObjectKey, serde_json::Value>,
    failures: HashSet<(Operation, String)>,
}

impl Store {
    fn check<K: SubstrateResource>(&self, operation: Operation) -> Result<(), SubstrateError> {
        let kind = K::kind_name();
        if self.failures.contains(&(operation, kind.clone())) {
            return Err(SubstrateError::Unavailable { operation, kind });
        }
        Ok(())
    }

    fn decode<K: SubstrateResource>(value: &serde_json::Value) -> Result<K, SubstrateError> {
        serde_json::from_value(value.clone()).map_err(SubstrateError::Serialization)
    }
}

/// In-process object store for local runs and tests.
///
/// Objects are stored as JSON, keyed by kind and name, in a single namespace.
/// Individual operations can be made to fail per kind with [`MemorySubstrate::fail_on`].
pub struct MemorySubstrate {
    namespace: String,
    store: Mutex<Store>,
}

impl MemorySubstrate {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            store: Mutex::new(Store::default()),
        }
    }

    /// Makes every following `operation` on `K` fail until [`MemorySubstrate::clear_failures`].
    pub async fn fail_on<K: SubstrateResource>(&self, operation: Operation) {
        self.store
            .lock()
            .await
            .failures
            .insert((operation, K::kind_name()));
    }

    pub async fn clear_failures(&self) {
        self.store.lock().await.failures.clear();
    }

    /// Number of stored objects of kind `K`.
    pub async fn count<K: SubstrateResource>(&self) -> usize {
        let kind = K::kind_name();
        self.store
            .lock()
            .await
            .objects
            .keys()
            .filter(|(object_kind, _)| object_kind == &kind)
            .count()
    }

    /// Plays the part of the workload controller by recording observed ready replicas.
    pub async fn set_ready_replicas(
        &self,
        name: &str,
        ready_replicas: i32,
    ) -> Result<(), SubstrateError> {
        let mut store = self.store.lock().await;
        let key = (Deployment::kind_name(), name.to_string());

        let value = store
            .objects
            .get(&key)
            .ok_or_else(|| SubstrateError::not_found::<Deployment>(name))?;
        let mut deployment: Deployment = Store::decode(value)?;

        let status = deployment.status.get_or_insert_with(DeploymentStatus::default);
        status.ready_replicas = Some(ready_replicas);
        status.replicas = Some(ready_replicas);

        let value = serde_json::to_value(&deployment).map_err(SubstrateError::Serialization)?;
        store.objects.insert(key, value);

        Ok(())
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, label_selector: &str) -> bool {
    label_selector
        .split(',')
        .map(str::trim)
        .filter(|requirement| !requirement.is_empty())
        .all(|requirement| match requirement.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(requirement),
        })
}

#[async_trait]
impl Substrate for MemorySubstrate {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create<K: SubstrateResource>(&self, resource: &K) -> Result<K, SubstrateError> {
        let mut store = self.store.lock().await;
        store.check::<K>(Operation::Create)?;

        let name = resource.name_any();
        let key = (K::kind_name(), name.clone());
        if store.objects.contains_key(&key) {
            return Err(SubstrateError::already_exists::<K>(&name));
        }

        let mut resource = resource.clone();
        let meta = resource.meta_mut();
        meta.namespace = Some(self.namespace.clone());
        meta.creation_timestamp = Some(Time(Utc::now()));

        let value = serde_json::to_value(&resource).map_err(SubstrateError::Serialization)?;
        store.objects.insert(key, value);

        Ok(resource)
    }

    async fn get_opt<K: SubstrateResource>(&self, name: &str) -> Result<Option<K>, SubstrateError> {
        let store = self.store.lock().await;
        store.check::<K>(Operation::Get)?;

        store
            .objects
            .get(&(K::kind_name(), name.to_string()))
            .map(Store::decode::<K>)
            .transpose()
    }

    async fn replace<K: SubstrateResource>(
        &self,
        name: &str,
        resource: &K,
    ) -> Result<K, SubstrateError> {
        let mut store = self.store.lock().await;
        store.check::<K>(Operation::Replace)?;

        let key = (K::kind_name(), name.to_string());
        let existing: K = match store.objects.get(&key) {
            Some(value) => Store::decode(value)?,
            None => return Err(SubstrateError::not_found::<K>(name)),
        };

        let mut resource = resource.clone();
        let meta = resource.meta_mut();
        meta.namespace = Some(self.namespace.clone());
        meta.creation_timestamp = existing.meta().creation_timestamp.clone();

        let value = serde_json::to_value(&resource).map_err(SubstrateError::Serialization)?;
        store.objects.insert(key, value);

        Ok(resource)
    }

    async fn delete<K: SubstrateResource>(&self, name: &str) -> Result<(), SubstrateError> {
        let mut store = self.store.lock().await;
        store.check::<K>(Operation::Delete)?;

        store
            .objects
            .remove(&(K::kind_name(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| SubstrateError::not_found::<K>(name))
    }

    async fn list<K: SubstrateResource>(
        &self,
        label_selector: &str,
    ) -> Result<Vec<K>, SubstrateError> {
        let store = self.store.lock().await;
        store.check::<K>(Operation::List)?;

        let kind = K::kind_name();
        let mut resources = Vec::new();
        for ((object_kind, _), value) in store.objects.iter() {
            if object_kind != &kind {
                continue;
            }
            let resource: K = Store::decode(value)?;
            if matches_selector(resource.labels(), label_selector) {
                resources.push(resource);
            }
        }

        Ok(resources)
    }

    async fn ping(&self) -> Result<(), SubstrateError> {
        Ok(())
    }
}
