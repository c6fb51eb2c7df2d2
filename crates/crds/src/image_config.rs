//! Cluster image configuration (`config.openshift.io/v1` `Image`)
//!
//! A cluster-scoped singleton named `cluster`. The operator only reads
//! `spec.additionalTrustedCA`, which names a ConfigMap in `openshift-config`
//! holding extra registry CA certificates.

use crate::references::ConfigMapNameReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the cluster image configuration singleton
pub const IMAGE_CONFIG_NAME: &str = "cluster";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Image",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// ConfigMap in `openshift-config` with additional registry CAs, keyed
    /// by registry hostname
    #[serde(rename = "additionalTrustedCA", default)]
    pub additional_trusted_ca: ConfigMapNameReference,
}

impl Image {
    /// Whether this is the cluster singleton
    pub fn is_cluster_singleton(&self) -> bool {
        self.metadata.name.as_deref() == Some(IMAGE_CONFIG_NAME)
            && self.metadata.namespace.as_deref().unwrap_or_default().is_empty()
    }

    /// Name of the referenced trusted CA ConfigMap, if one is configured
    pub fn trusted_ca_name(&self) -> Option<&str> {
        let reference = &self.spec.additional_trusted_ca;
        reference.is_set().then_some(reference.name.as_str())
    }
}
