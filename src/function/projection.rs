//! Reconstructs a [`Function`] from its workload.
//!
//! The workload is the only object consulted. `runtime` and `handler` come back
//! from the reserved environment variables, `min_replicas` from the desired
//! replica count (which the autoscaler may have moved), `replicas` from the
//! observed ready count. Any existing workload is reported as running.

use super::{Function, FunctionStatus, Trigger};
use crate::consts::{
    FUNCTION_HANDLER_ENV_VAR, RUNNING_STATE, RUNTIME_ENV_VAR, TRIGGERS_ANNOTATION,
};
use k8s_openapi::api::{apps::v1::Deployment, core::v1::EnvVar};
use kube::ResourceExt;

/// First value of the named variable, empty when absent.
pub fn env_var_value(env_vars: &[EnvVar], name: &str) -> String {
    env_vars
        .iter()
        .find(|env| env.name == name)
        .and_then(|env| env.value.clone())
        .unwrap_or_default()
}

pub fn endpoint(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}.svc.cluster.local")
}

fn triggers(deployment: &Deployment) -> Vec<Trigger> {
    deployment
        .annotations()
        .get(TRIGGERS_ANNOTATION)
        .and_then(|triggers| match serde_json::from_str(triggers) {
            Ok(triggers) => Some(triggers),
            Err(error) => {
                tracing::warn!(%error, "Workload has malformed triggers annotation. Ignoring.");
                None
            }
        })
        .unwrap_or_default()
}

impl From<&Deployment> for Function {
    fn from(deployment: &Deployment) -> Self {
        let name = deployment.name_any();
        let namespace = deployment.namespace().unwrap_or_default();

        let spec = deployment.spec.as_ref();
        let env_vars = spec
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|pod| pod.containers.first())
            .and_then(|container| container.env.as_deref())
            .unwrap_or_default();

        let ready_replicas = deployment
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or_default();

        Function {
            runtime: env_var_value(env_vars, RUNTIME_ENV_VAR),
            handler: env_var_value(env_vars, FUNCTION_HANDLER_ENV_VAR),
            min_replicas: spec.and_then(|spec| spec.replicas).unwrap_or_default(),
            triggers: triggers(deployment),
            status: FunctionStatus {
                state: String::from(RUNNING_STATE),
                endpoint: endpoint(&name, &namespace),
                replicas: ready_replicas,
                last_deployment: deployment
                    .metadata
                    .creation_timestamp
                    .as_ref()
                    .map(|time| time.0),
            },
            name,
            ..Default::default()
        }
    }
}
