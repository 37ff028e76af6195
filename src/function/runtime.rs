use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of runtimes a function can be deployed on.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Runtime {
    /// Unknown runtime identifiers fall back to this one.
    #[default]
    #[serde(rename = "nodejs18")]
    NodeJs18,
    #[serde(rename = "python39")]
    Python39,
    #[serde(rename = "go119")]
    Go119,
}

impl Runtime {
    pub const ALL: [Runtime; 3] = [Runtime::NodeJs18, Runtime::Python39, Runtime::Go119];

    pub fn id(&self) -> &'static str {
        match self {
            Runtime::NodeJs18 => "nodejs18",
            Runtime::Python39 => "python39",
            Runtime::Go119 => "go119",
        }
    }

    pub fn image(&self) -> &'static str {
        match self {
            Runtime::NodeJs18 => "node:18-alpine",
            Runtime::Python39 => "python:3.9-alpine",
            Runtime::Go119 => "golang:1.19-alpine",
        }
    }

    pub fn from_id(id: &str) -> Option<Runtime> {
        Runtime::ALL.into_iter().find(|runtime| runtime.id() == id)
    }

    /// Resolves an identifier, substituting the default for anything outside the closed set.
    pub fn resolve(id: &str) -> Runtime {
        match Runtime::from_id(id) {
            Some(runtime) => runtime,
            None => {
                let fallback = Runtime::default();
                tracing::warn!(runtime = %id, %fallback, "Unknown runtime. Falling back to default.");
                fallback
            }
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Container image for a runtime identifier. Unknown identifiers get the `nodejs18` image.
pub fn runtime_image(runtime: &str) -> &'static str {
    Runtime::resolve(runtime).image()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_runtimes_map_to_fixed_images() {
        assert_eq!(runtime_image("nodejs18"), "node:18-alpine");
        assert_eq!(runtime_image("python39"), "python:3.9-alpine");
        assert_eq!(runtime_image("go119"), "golang:1.19-alpine");
    }

    #[test]
    fn unknown_runtimes_fall_back_to_nodejs18_image() {
        assert_eq!(runtime_image("ruby32"), "node:18-alpine");
        assert_eq!(runtime_image(""), "node:18-alpine");
        assert_eq!(runtime_image("Python39"), "node:18-alpine");
    }

    #[test]
    fn ids_round_trip() {
        for runtime in Runtime::ALL {
            assert_eq!(Runtime::from_id(runtime.id()), Some(runtime));
        }
    }
}
