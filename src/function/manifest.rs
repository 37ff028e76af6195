use super::{runtime::Runtime, Function};
use crate::consts::{
    CODE_BUNDLE_CODE_KEY, CODE_BUNDLE_HANDLER_KEY, CODE_BUNDLE_SUFFIX, CODE_MOUNT_PATH,
    CODE_VOLUME_NAME, CONTAINER_NAME, CONTAINER_PORT, CPU_LIMIT, CPU_REQUEST,
    CPU_TARGET_UTILIZATION, FUNCTION_HANDLER_ENV_VAR, FUNCTION_LABEL, FUNCTION_NAME_ENV_VAR,
    MANAGED_BY_LABEL, MANAGED_BY_VALUE, MEMORY_LIMIT, MEMORY_REQUEST, NAME_LABEL, PORT_NAME,
    RUNTIME_ENV_VAR, SERVICE_PORT, TRIGGERS_ANNOTATION,
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        autoscaling::v2::{
            CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
            MetricSpec, MetricTarget, ResourceMetricSource,
        },
        core::v1::{
            ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PodSpec,
            PodTemplateSpec, ResourceRequirements, Service, ServicePort, ServiceSpec, Volume,
            VolumeMount,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, util::intstr::IntOrString,
    },
};
use kube::core::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// One of the four substrate objects backing a function.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    CodeBundle,
    Workload,
    NetworkEndpoint,
    AutoscalingPolicy,
}

impl ResourceKind {
    /// Creation order. Deletion uses [`ResourceKind::DELETION_ORDER`].
    pub const CREATION_ORDER: [ResourceKind; 4] = [
        ResourceKind::CodeBundle,
        ResourceKind::Workload,
        ResourceKind::NetworkEndpoint,
        ResourceKind::AutoscalingPolicy,
    ];

    pub const DELETION_ORDER: [ResourceKind; 4] = [
        ResourceKind::Workload,
        ResourceKind::NetworkEndpoint,
        ResourceKind::CodeBundle,
        ResourceKind::AutoscalingPolicy,
    ];

    pub fn resource_name(&self, function_name: &str) -> String {
        match self {
            ResourceKind::CodeBundle => code_bundle_name(function_name),
            _ => function_name.to_string(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::CodeBundle => "code bundle",
            ResourceKind::Workload => "workload",
            ResourceKind::NetworkEndpoint => "network endpoint",
            ResourceKind::AutoscalingPolicy => "autoscaling policy",
        };
        f.write_str(name)
    }
}

pub fn code_bundle_name(function_name: &str) -> String {
    format!("{function_name}{CODE_BUNDLE_SUFFIX}")
}

/// Builds the resource quadruple of a function inside a namespace.
pub struct Manifest<'a> {
    function: &'a Function,
    namespace: &'a str,
    runtime: Runtime,
}

impl<'a> Manifest<'a> {
    pub fn new(function: &'a Function, namespace: &'a str) -> Self {
        Self {
            function,
            namespace,
            runtime: Runtime::resolve(&function.runtime),
        }
    }

    pub fn to_name(&self) -> String {
        self.function.name.clone()
    }

    pub fn to_code_bundle_name(&self) -> String {
        code_bundle_name(&self.function.name)
    }

    pub fn to_image(&self) -> String {
        self.runtime.image().to_string()
    }

    fn to_labels(&self) -> BTreeMap<String, String> {
        [
            (String::from(NAME_LABEL), self.to_name()),
            (String::from(MANAGED_BY_LABEL), String::from(MANAGED_BY_VALUE)),
        ]
        .into()
    }

    fn to_selector_labels(&self) -> BTreeMap<String, String> {
        [(String::from(FUNCTION_LABEL), self.to_name())].into()
    }

    fn to_workload_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.to_labels();
        labels.extend(self.to_selector_labels());
        labels
    }

    fn to_meta(&self, name: String, labels: BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        }
    }

    fn to_workload_annotations(&self) -> Option<BTreeMap<String, String>> {
        if self.function.triggers.is_empty() {
            return None;
        }

        match serde_json::to_string(&self.function.triggers) {
            Ok(triggers) => Some([(String::from(TRIGGERS_ANNOTATION), triggers)].into()),
            Err(error) => {
                tracing::warn!(%error, "Failed to serialize triggers. Skipping annotation.");
                None
            }
        }
    }

    /// Reserved variables first, user entries appended afterwards without deduplication.
    pub fn to_env_vars(&self) -> Vec<EnvVar> {
        let reserved = [
            (FUNCTION_NAME_ENV_VAR, self.function.name.as_str()),
            (FUNCTION_HANDLER_ENV_VAR, self.function.handler.as_str()),
            (RUNTIME_ENV_VAR, self.function.runtime.as_str()),
        ];

        reserved
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .chain(self.function.environment.clone())
            .map(|(name, value)| EnvVar {
                name,
                value: Some(value),
                ..Default::default()
            })
            .collect()
    }

    fn to_resources(&self) -> ResourceRequirements {
        let quantities = |cpu: &str, memory: &str| {
            BTreeMap::from([
                (String::from("cpu"), Quantity(cpu.to_string())),
                (String::from("memory"), Quantity(memory.to_string())),
            ])
        };

        ResourceRequirements {
            requests: Some(quantities(CPU_REQUEST, MEMORY_REQUEST)),
            limits: Some(quantities(CPU_LIMIT, MEMORY_LIMIT)),
            ..Default::default()
        }
    }

    fn to_container(&self) -> Container {
        Container {
            name: String::from(CONTAINER_NAME),
            image: Some(self.to_image()),
            ports: Some(vec![ContainerPort {
                name: Some(String::from(PORT_NAME)),
                container_port: CONTAINER_PORT,
                ..Default::default()
            }]),
            env: Some(self.to_env_vars()),
            volume_mounts: Some(vec![VolumeMount {
                name: String::from(CODE_VOLUME_NAME),
                mount_path: String::from(CODE_MOUNT_PATH),
                ..Default::default()
            }]),
            resources: Some(self.to_resources()),
            ..Default::default()
        }
    }

    fn to_code_volume(&self) -> Volume {
        Volume {
            name: String::from(CODE_VOLUME_NAME),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(self.to_code_bundle_name()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Renders all four resources as a multi-document YAML stream, in creation order.
    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        let documents = [
            serde_yaml::to_string(&ConfigMap::from(self))?,
            serde_yaml::to_string(&Deployment::from(self))?,
            serde_yaml::to_string(&Service::from(self))?,
            serde_yaml::to_string(&HorizontalPodAutoscaler::from(self))?,
        ];

        Ok(documents.join("---\n"))
    }
}

/// Generate a fresh code bundle
impl From<&Manifest<'_>> for ConfigMap {
    fn from(value: &Manifest<'_>) -> Self {
        ConfigMap {
            metadata: value.to_meta(value.to_code_bundle_name(), value.to_labels()),
            data: Some(BTreeMap::from([
                (
                    String::from(CODE_BUNDLE_HANDLER_KEY),
                    value.function.handler.clone(),
                ),
                (String::from(CODE_BUNDLE_CODE_KEY), value.function.code.clone()),
            ])),
            ..Default::default()
        }
    }
}

impl From<&Manifest<'_>> for PodTemplateSpec {
    fn from(value: &Manifest<'_>) -> Self {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(value.to_workload_labels()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![value.to_container()],
                volumes: Some(vec![value.to_code_volume()]),
                ..Default::default()
            }),
        }
    }
}

/// Generate a fresh workload
impl From<&Manifest<'_>> for Deployment {
    fn from(value: &Manifest<'_>) -> Self {
        let mut metadata = value.to_meta(value.to_name(), value.to_workload_labels());
        metadata.annotations = value.to_workload_annotations();

        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: Some(value.function.min_replicas),
                selector: LabelSelector {
                    match_labels: Some(value.to_selector_labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec::from(value),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Generate a fresh network endpoint
impl From<&Manifest<'_>> for Service {
    fn from(value: &Manifest<'_>) -> Self {
        Service {
            metadata: value.to_meta(value.to_name(), value.to_labels()),
            spec: Some(ServiceSpec {
                type_: Some(String::from("ClusterIP")),
                ports: Some(vec![ServicePort {
                    name: Some(String::from(PORT_NAME)),
                    port: SERVICE_PORT,
                    target_port: Some(IntOrString::Int(CONTAINER_PORT)),
                    ..Default::default()
                }]),
                selector: Some(value.to_selector_labels()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Generate a fresh autoscaling policy
impl From<&Manifest<'_>> for HorizontalPodAutoscaler {
    fn from(value: &Manifest<'_>) -> Self {
        HorizontalPodAutoscaler {
            metadata: value.to_meta(value.to_name(), value.to_labels()),
            spec: Some(HorizontalPodAutoscalerSpec {
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some(String::from("apps/v1")),
                    kind: String::from("Deployment"),
                    name: value.to_name(),
                },
                min_replicas: Some(value.function.min_replicas),
                max_replicas: value.function.max_replicas,
                metrics: Some(vec![MetricSpec {
                    type_: String::from("Resource"),
                    resource: Some(ResourceMetricSource {
                        name: String::from("cpu"),
                        target: MetricTarget {
                            type_: String::from("Utilization"),
                            average_utilization: Some(CPU_TARGET_UTILIZATION),
                            ..Default::default()
                        },
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
