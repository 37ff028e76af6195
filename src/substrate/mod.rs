//! The container-orchestration API the orchestrator drives.
//!
//! Objects are keyed by name within one namespace. Implementations must be
//! safe to share between concurrent requests.

pub mod cluster;
pub mod memory;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Error as KubeError, Resource};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::{self, Debug};
use thiserror::Error as ThisError;

/// A namespaced object the substrate can store.
pub trait SubstrateResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn kind_name() -> String {
        Self::kind(&()).to_string()
    }
}

impl<K> SubstrateResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Operation {
    Create,
    Get,
    Replace,
    Delete,
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Get => "get",
            Operation::Replace => "replace",
            Operation::Delete => "delete",
            Operation::List => "list",
        };
        f.write_str(name)
    }
}

#[derive(ThisError, Debug)]
pub enum SubstrateError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("Kubernetes error: {0}")]
    Kube(#[source] KubeError),
    #[error("Failed to convert resource: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("Substrate unavailable: failed to {operation} {kind}")]
    Unavailable { operation: Operation, kind: String },
}

impl SubstrateError {
    pub fn not_found<K: SubstrateResource>(name: &str) -> Self {
        Self::NotFound {
            kind: K::kind_name(),
            name: name.to_string(),
        }
    }

    pub fn already_exists<K: SubstrateResource>(name: &str) -> Self {
        Self::AlreadyExists {
            kind: K::kind_name(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[async_trait]
pub trait Substrate: Send + Sync + 'static {
    /// The namespace every object lives in.
    fn namespace(&self) -> &str;

    async fn create<K: SubstrateResource>(&self, resource: &K) -> Result<K, SubstrateError>;

    async fn get_opt<K: SubstrateResource>(&self, name: &str) -> Result<Option<K>, SubstrateError>;

    /// Overwrites the stored object. No conflict detection is performed.
    async fn replace<K: SubstrateResource>(
        &self,
        name: &str,
        resource: &K,
    ) -> Result<K, SubstrateError>;

    async fn delete<K: SubstrateResource>(&self, name: &str) -> Result<(), SubstrateError>;

    /// Lists objects matching an equality-based label selector, e.g. `a=b,c=d`.
    async fn list<K: SubstrateResource>(
        &self,
        label_selector: &str,
    ) -> Result<Vec<K>, SubstrateError>;

    /// Checks that the substrate and its namespace are reachable.
    async fn ping(&self) -> Result<(), SubstrateError>;

    async fn get<K: SubstrateResource>(&self, name: &str) -> Result<K, SubstrateError> {
        self.get_opt::<K>(name)
            .await?
            .ok_or_else(|| SubstrateError::not_found::<K>(name))
    }
}
