pub mod file;
pub mod manifest;
pub mod projection;
pub mod runtime;

use crate::consts::{DEFAULT_MAX_REPLICAS, DEFAULT_MIN_REPLICAS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// A serverless function as seen by platform users.
///
/// Only `name`, `runtime`, `handler`, `code`, `environment`, the replica bounds
/// and `triggers` are inputs. `status` is recomputed from the workload on every read.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    /// name must be a valid DNS label, it names every backing resource
    pub name: String,

    /// runtime identifier, e.g. `nodejs18`, `python39`, `go119`
    #[serde(default)]
    pub runtime: String,

    /// handler names the entry point inside the code, e.g. `index.handler`
    #[serde(default)]
    pub handler: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// zero means unset
    #[serde(default, skip_serializing_if = "is_zero")]
    pub min_replicas: i32,

    /// zero means unset
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_replicas: i32,

    /// triggers are stored but not acted upon
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,

    #[serde(default)]
    pub status: FunctionStatus,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    #[serde(default)]
    pub state: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    #[serde(default)]
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment: Option<DateTime<Utc>>,
}

/// Usage figures for a function. Values are placeholders, not live telemetry.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetrics {
    pub invocations: i64,
    pub cold_starts: i64,
    pub avg_duration: f64,
    pub error_rate: f64,
    pub cost_estimate: f64,
}

impl FunctionMetrics {
    pub fn placeholder() -> Self {
        Self {
            invocations: 100,
            cold_starts: 5,
            avg_duration: 0.250,
            error_rate: 0.01,
            cost_estimate: 0.05,
        }
    }
}

/// Acknowledgement returned by the control plane's invoke path.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct InvocationAck {
    pub function: String,
    pub status: String,
}

impl InvocationAck {
    pub fn invoked(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            status: String::from("invoked"),
        }
    }
}

#[derive(ThisError, Debug, PartialEq, Eq)]
pub enum InvalidNameError {
    #[error("name is empty")]
    Empty,
    #[error("name is longer than 63 characters")]
    TooLong,
    #[error("name must consist of lowercase alphanumerics or '-'")]
    InvalidCharacter,
    #[error("name must start with a lowercase letter")]
    InvalidStart,
    #[error("name must start and end with an alphanumeric character")]
    InvalidEdge,
}

pub const MAX_NAME_LENGTH: usize = 63;

impl Function {
    /// Zero-valued replica bounds are treated as unset.
    pub fn apply_defaults(&mut self) {
        if self.min_replicas == 0 {
            self.min_replicas = DEFAULT_MIN_REPLICAS;
        }
        if self.max_replicas == 0 {
            self.max_replicas = DEFAULT_MAX_REPLICAS;
        }
    }

    pub fn with_defaults(mut self) -> Self {
        self.apply_defaults();
        self
    }

    /// Checks the name against the DNS-1035 label rules. The service is the
    /// strictest of the backing resources.
    pub fn validate_name(&self) -> Result<(), InvalidNameError> {
        validate_name(&self.name)
    }
}

pub fn validate_name(name: &str) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(InvalidNameError::TooLong);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(InvalidNameError::InvalidCharacter);
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(InvalidNameError::InvalidEdge);
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(InvalidNameError::InvalidStart);
    }
    Ok(())
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}
