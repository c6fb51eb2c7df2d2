//! Object references used across the OpenShift config APIs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a ConfigMap by name.
///
/// The namespace is implied by the referencing API; for the cluster image
/// configuration it is always `openshift-config`. An empty name means the
/// reference is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapNameReference {
    /// Name of the referenced ConfigMap
    #[serde(default)]
    pub name: String,
}

impl ConfigMapNameReference {
    /// Create a reference to the named ConfigMap
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Whether the reference names anything
    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}
