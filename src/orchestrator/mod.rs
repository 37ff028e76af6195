//! Maps one function onto its resource quadruple and keeps the four objects
//! in step across create, update and delete.
//!
//! Multi-resource sequences are not transactional. A failed create leaves the
//! resources created before the failing step in place (see
//! [`CreateFunctionError::created_before_failure`]) and a failed delete may leave
//! some of them behind. [`Orchestrator::probe_function`] reports which of the
//! four exist. Updates read and write the workload without conflict detection.

pub mod errors;

use crate::{
    consts::{CODE_BUNDLE_CODE_KEY, CODE_BUNDLE_HANDLER_KEY, MANAGED_BY_SELECTOR},
    function::{
        manifest::{Manifest, ResourceKind},
        Function, FunctionMetrics, InvocationAck,
    },
    substrate::{Substrate, SubstrateError, SubstrateResource},
};
pub use errors::*;
use k8s_openapi::api::{
    apps::v1::Deployment,
    autoscaling::v2::HorizontalPodAutoscaler,
    core::v1::{ConfigMap, Service},
};
use serde::{Deserialize, Serialize};
use tracing::{trace_span, Instrument};

/// Which of a function's four resources currently exist.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum QuadrupleState {
    Absent,
    PartiallyCreated {
        present: Vec<ResourceKind>,
        missing: Vec<ResourceKind>,
    },
    Ready,
}

pub struct Orchestrator<S> {
    substrate: S,
}

impl<S: Substrate> Orchestrator<S> {
    pub fn new(substrate: S) -> Self {
        Self { substrate }
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn namespace(&self) -> &str {
        self.substrate.namespace()
    }

    pub async fn ping(&self) -> Result<(), PingError> {
        self.substrate.ping().await.map_err(PingError)
    }

    /// Creates code bundle, workload, network endpoint and autoscaling policy, in that order.
    ///
    /// Returns the function with defaults applied.
    pub async fn create_function(
        &self,
        function: Function,
    ) -> Result<Function, CreateFunctionError> {
        let span = trace_span!("CreateFunction", name = %function.name);
        self.create(function).instrument(span).await
    }

    async fn create(&self, mut function: Function) -> Result<Function, CreateFunctionError> {
        function.apply_defaults();
        function
            .validate_name()
            .map_err(|error| CreateFunctionError::InvalidName {
                name: function.name.clone(),
                error,
            })?;

        let manifest = Manifest::new(&function, self.namespace());

        tracing::info!("Creating code bundle.");
        self.substrate
            .create(&ConfigMap::from(&manifest))
            .instrument(trace_span!("CreateCodeBundle"))
            .await
            .map_err(CreateFunctionError::CodeBundle)?;

        tracing::info!("Creating workload.");
        self.substrate
            .create(&Deployment::from(&manifest))
            .instrument(trace_span!("CreateWorkload"))
            .await
            .map_err(CreateFunctionError::Workload)?;

        tracing::info!("Creating network endpoint.");
        self.substrate
            .create(&Service::from(&manifest))
            .instrument(trace_span!("CreateNetworkEndpoint"))
            .await
            .map_err(CreateFunctionError::NetworkEndpoint)?;

        tracing::info!("Creating autoscaling policy.");
        self.substrate
            .create(&HorizontalPodAutoscaler::from(&manifest))
            .instrument(trace_span!("CreateAutoscalingPolicy"))
            .await
            .map_err(CreateFunctionError::AutoscalingPolicy)?;

        tracing::info!(
            min_replicas = function.min_replicas,
            max_replicas = function.max_replicas,
            "Function created."
        );

        Ok(function)
    }

    /// Rewrites the code bundle, then the workload's image and environment.
    ///
    /// The network endpoint and autoscaling policy are left untouched, so new
    /// replica bounds do not reach the live autoscaling policy.
    pub async fn update_function(
        &self,
        name: &str,
        function: Function,
    ) -> Result<Function, UpdateFunctionError> {
        let span = trace_span!("UpdateFunction", %name);
        self.update(name, function).instrument(span).await
    }

    async fn update(
        &self,
        name: &str,
        mut function: Function,
    ) -> Result<Function, UpdateFunctionError> {
        function.name = name.to_string();
        let manifest = Manifest::new(&function, self.namespace());

        tracing::info!("Updating code bundle.");
        let code_bundle_name = manifest.to_code_bundle_name();
        let mut code_bundle: ConfigMap = self
            .substrate
            .get(&code_bundle_name)
            .await
            .map_err(UpdateFunctionError::GetCodeBundle)?;

        let data = code_bundle.data.get_or_insert_with(Default::default);
        data.insert(
            String::from(CODE_BUNDLE_HANDLER_KEY),
            function.handler.clone(),
        );
        data.insert(String::from(CODE_BUNDLE_CODE_KEY), function.code.clone());

        self.substrate
            .replace(&code_bundle_name, &code_bundle)
            .await
            .map_err(UpdateFunctionError::ReplaceCodeBundle)?;

        tracing::info!("Updating workload.");
        let mut workload: Deployment = self
            .substrate
            .get(name)
            .await
            .map_err(UpdateFunctionError::GetWorkload)?;

        let container = workload
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .and_then(|pod| pod.containers.first_mut())
            .ok_or_else(|| UpdateFunctionError::NoContainer(name.to_string()))?;

        container.image = Some(manifest.to_image());
        container.env = Some(manifest.to_env_vars());

        self.substrate
            .replace(name, &workload)
            .await
            .map_err(UpdateFunctionError::ReplaceWorkload)?;

        tracing::info!("Function updated.");

        Ok(function)
    }

    /// Deletes workload, network endpoint, code bundle and autoscaling policy, in that order.
    ///
    /// Every deletion is attempted. Resources that are already gone are skipped,
    /// other failures are collected into [`DeleteFunctionError::Partial`].
    pub async fn delete_function(&self, name: &str) -> Result<(), DeleteFunctionError> {
        let span = trace_span!("DeleteFunction", %name);
        self.delete(name).instrument(span).await
    }

    async fn delete(&self, name: &str) -> Result<(), DeleteFunctionError> {
        let mut absent = 0;
        let mut failures = Vec::new();

        for kind in ResourceKind::DELETION_ORDER {
            match self.delete_resource(kind, name).await {
                Ok(()) => {
                    tracing::info!(%kind, "Deleted.");
                }
                Err(error) if error.is_not_found() => {
                    tracing::info!(%kind, "Already absent. Skipping.");
                    absent += 1;
                }
                Err(error) => {
                    tracing::error!(%kind, %error, "Failed to delete.");
                    failures.push((kind, error));
                }
            }
        }

        if !failures.is_empty() {
            return Err(DeleteFunctionError::Partial(failures));
        }

        if absent == ResourceKind::DELETION_ORDER.len() {
            return Err(DeleteFunctionError::NotFound(name.to_string()));
        }

        tracing::info!("Function deleted.");

        Ok(())
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        function_name: &str,
    ) -> Result<(), SubstrateError> {
        let name = kind.resource_name(function_name);

        match kind {
            ResourceKind::CodeBundle => self.substrate.delete::<ConfigMap>(&name).await,
            ResourceKind::Workload => self.substrate.delete::<Deployment>(&name).await,
            ResourceKind::NetworkEndpoint => self.substrate.delete::<Service>(&name).await,
            ResourceKind::AutoscalingPolicy => {
                self.substrate
                    .delete::<HorizontalPodAutoscaler>(&name)
                    .await
            }
        }
    }

    /// Projects the function's status from its workload.
    pub async fn get_function(&self, name: &str) -> Result<Function, GetFunctionError> {
        let workload: Option<Deployment> = self
            .substrate
            .get_opt(name)
            .instrument(trace_span!("GetFunction", %name))
            .await
            .map_err(GetFunctionError::Workload)?;

        workload
            .as_ref()
            .map(Function::from)
            .ok_or_else(|| GetFunctionError::NotFound(name.to_string()))
    }

    pub async fn list_functions(&self) -> Result<Vec<Function>, ListFunctionsError> {
        let workloads: Vec<Deployment> = self
            .substrate
            .list(MANAGED_BY_SELECTOR)
            .instrument(trace_span!("ListFunctions"))
            .await
            .map_err(ListFunctionsError)?;

        Ok(workloads.iter().map(Function::from).collect())
    }

    /// Confirms the network endpoint exists and acknowledges the invocation.
    ///
    /// The payload is not forwarded to the function.
    pub async fn invoke_function(
        &self,
        name: &str,
        payload: &[u8],
    ) -> Result<InvocationAck, InvokeFunctionError> {
        let endpoint: Option<Service> = self
            .substrate
            .get_opt(name)
            .instrument(trace_span!("InvokeFunction", %name))
            .await
            .map_err(InvokeFunctionError::NetworkEndpoint)?;

        if endpoint.is_none() {
            return Err(InvokeFunctionError::NotFound(name.to_string()));
        }

        tracing::debug!(%name, payload_size = payload.len(), "Invocation acknowledged.");

        Ok(InvocationAck::invoked(name))
    }

    /// Placeholder figures. No telemetry backs them.
    pub fn function_metrics(&self, name: &str) -> FunctionMetrics {
        tracing::debug!(%name, "Returning placeholder metrics.");
        FunctionMetrics::placeholder()
    }

    /// Reads all four resources and reports which of them exist.
    pub async fn probe_function(&self, name: &str) -> Result<QuadrupleState, ProbeFunctionError> {
        let (code_bundle, workload, network_endpoint, autoscaling_policy) = futures::try_join!(
            self.resource_exists(ResourceKind::CodeBundle, name),
            self.resource_exists(ResourceKind::Workload, name),
            self.resource_exists(ResourceKind::NetworkEndpoint, name),
            self.resource_exists(ResourceKind::AutoscalingPolicy, name),
        )
        .map_err(|(kind, error)| ProbeFunctionError { kind, error })?;

        let (present, missing): (Vec<_>, Vec<_>) = ResourceKind::CREATION_ORDER
            .into_iter()
            .zip([code_bundle, workload, network_endpoint, autoscaling_policy])
            .partition(|(_, exists)| *exists);

        let present: Vec<_> = present.into_iter().map(|(kind, _)| kind).collect();
        let missing: Vec<_> = missing.into_iter().map(|(kind, _)| kind).collect();

        let state = if present.is_empty() {
            QuadrupleState::Absent
        } else if missing.is_empty() {
            QuadrupleState::Ready
        } else {
            QuadrupleState::PartiallyCreated { present, missing }
        };

        tracing::debug!(%name, ?state, "Probed function resources.");

        Ok(state)
    }

    async fn resource_exists(
        &self,
        kind: ResourceKind,
        function_name: &str,
    ) -> Result<bool, (ResourceKind, SubstrateError)> {
        let name = kind.resource_name(function_name);

        let exists = match kind {
            ResourceKind::CodeBundle => self.exists::<ConfigMap>(&name).await,
            ResourceKind::Workload => self.exists::<Deployment>(&name).await,
            ResourceKind::NetworkEndpoint => self.exists::<Service>(&name).await,
            ResourceKind::AutoscalingPolicy => {
                self.exists::<HorizontalPodAutoscaler>(&name).await
            }
        };

        exists.map_err(|error| (kind, error))
    }

    async fn exists<K: SubstrateResource>(&self, name: &str) -> Result<bool, SubstrateError> {
        Ok(self.substrate.get_opt::<K>(name).await?.is_some())
    }
}
