use crate::{
    function::{manifest::ResourceKind, InvalidNameError},
    substrate::SubstrateError,
};
use itertools::Itertools;
use thiserror::Error as ThisError;

/// Classification shared by every orchestrator error, used by callers to
/// tell client-visible absence apart from internal failures.
pub trait OrchestratorError: std::error::Error + Send + Sync + 'static {
    fn is_not_found(&self) -> bool;

    fn is_invalid_input(&self) -> bool {
        false
    }
}

#[derive(ThisError, Debug)]
pub enum CreateFunctionError {
    #[error("Invalid function name {name:?}: {error}")]
    InvalidName {
        name: String,
        #[source]
        error: InvalidNameError,
    },
    #[error("Failed to create code bundle: {0}")]
    CodeBundle(#[source] SubstrateError),
    #[error("Failed to create workload: {0}")]
    Workload(#[source] SubstrateError),
    #[error("Failed to create network endpoint: {0}")]
    NetworkEndpoint(#[source] SubstrateError),
    #[error("Failed to create autoscaling policy: {0}")]
    AutoscalingPolicy(#[source] SubstrateError),
}

impl CreateFunctionError {
    /// Resources that were created before the failing step. They are left in place.
    pub fn created_before_failure(&self) -> &'static [ResourceKind] {
        let created = match self {
            Self::InvalidName { .. } | Self::CodeBundle(_) => 0,
            Self::Workload(_) => 1,
            Self::NetworkEndpoint(_) => 2,
            Self::AutoscalingPolicy(_) => 3,
        };
        &ResourceKind::CREATION_ORDER[..created]
    }
}

impl OrchestratorError for CreateFunctionError {
    fn is_not_found(&self) -> bool {
        false
    }

    fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidName { .. })
    }
}

#[derive(ThisError, Debug)]
pub enum UpdateFunctionError {
    #[error("Failed to get code bundle: {0}")]
    GetCodeBundle(#[source] SubstrateError),
    #[error("Failed to replace code bundle: {0}")]
    ReplaceCodeBundle(#[source] SubstrateError),
    #[error("Failed to get workload: {0}")]
    GetWorkload(#[source] SubstrateError),
    #[error("Workload {0:?} has no container")]
    NoContainer(String),
    #[error("Failed to replace workload: {0}")]
    ReplaceWorkload(#[source] SubstrateError),
}

impl OrchestratorError for UpdateFunctionError {
    fn is_not_found(&self) -> bool {
        match self {
            Self::GetCodeBundle(error) | Self::GetWorkload(error) => error.is_not_found(),
            _ => false,
        }
    }
}

#[derive(ThisError, Debug)]
pub enum DeleteFunctionError {
    #[error("Function {0:?} not found")]
    NotFound(String),
    #[error(
        "Failed to delete {}",
        .0.iter().map(|(kind, error)| format!("{kind} ({error})")).join(", ")
    )]
    Partial(Vec<(ResourceKind, SubstrateError)>),
}

impl OrchestratorError for DeleteFunctionError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(ThisError, Debug)]
pub enum GetFunctionError {
    #[error("Function {0:?} not found")]
    NotFound(String),
    #[error("Failed to get workload: {0}")]
    Workload(#[source] SubstrateError),
}

impl OrchestratorError for GetFunctionError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(ThisError, Debug)]
#[error("Failed to list workloads: {0}")]
pub struct ListFunctionsError(#[source] pub SubstrateError);

impl OrchestratorError for ListFunctionsError {
    fn is_not_found(&self) -> bool {
        false
    }
}

#[derive(ThisError, Debug)]
pub enum InvokeFunctionError {
    #[error("Function {0:?} not found")]
    NotFound(String),
    #[error("Failed to get network endpoint: {0}")]
    NetworkEndpoint(#[source] SubstrateError),
}

impl OrchestratorError for InvokeFunctionError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(ThisError, Debug)]
#[error("Failed to get {kind}: {error}")]
pub struct ProbeFunctionError {
    pub kind: ResourceKind,
    #[source]
    pub error: SubstrateError,
}

impl OrchestratorError for ProbeFunctionError {
    fn is_not_found(&self) -> bool {
        false
    }
}

#[derive(ThisError, Debug)]
#[error("Substrate is not ready: {0}")]
pub struct PingError(#[source] pub SubstrateError);

impl OrchestratorError for PingError {
    fn is_not_found(&self) -> bool {
        false
    }
}
