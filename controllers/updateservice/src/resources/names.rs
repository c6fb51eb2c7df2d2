//! Names and well-known constants for managed objects

use crds::UpdateService;
use kube::ResourceExt;

/// Shared system namespace holding cluster-wide configuration
pub const OPENSHIFT_CONFIG_NAMESPACE: &str = "openshift-config";
/// Cluster pull secret, in [`OPENSHIFT_CONFIG_NAMESPACE`]
pub const PULL_SECRET_NAME: &str = "pull-secret";
/// Default key of the registry CA certificate in the trusted CA ConfigMap
pub const DEFAULT_CA_CERT_KEY: &str = "updateservice-registry";

/// Cluster proxy CA ConfigMap (and its volume) in the instance namespace
pub const CLUSTER_CA_CONFIG_MAP: &str = "cluster-trusted-ca";
/// Key the platform injects the proxy CA bundle under
pub const CLUSTER_CA_CERT_KEY: &str = "ca-bundle.crt";
/// Mount point of the proxy CA bundle
pub const CLUSTER_CA_MOUNT_DIR: &str = "/etc/pki/ca-trust/extracted/cluster-ca/";

/// Volume holding the registry CA
pub const TRUSTED_CA_VOLUME: &str = "trusted-ca";
/// Mount point of the registry CA
pub const SSL_CERT_DIR: &str = "/etc/pki/ca-trust/extracted/pem";

/// Pod template annotation with the graph-builder config fingerprint
pub const GRAPH_BUILDER_CONFIG_HASH_ANNOTATION: &str =
    "updateservice.operator.openshift.io/graph-builder-config-hash";
/// Pod template annotation with the env config fingerprint
pub const ENV_CONFIG_HASH_ANNOTATION: &str = "updateservice.operator.openshift.io/env-config-hash";
/// Human-readable description of a managed object
pub const DESCRIPTION_ANNOTATION: &str = "kubernetes.io/description";
/// Pod template annotation pinning the resolved graph-data image
pub const GRAPH_DATA_IMAGE_ANNOTATION: &str = "updateservice.operator.openshift.io/graph-data-image";
/// Short-lived pod that pulls the graph-data tag to learn its digest
pub const GRAPH_DATA_DIGEST_POD: &str = "graph-data-tag-digest";

/// Key of the registry CA certificate in the trusted CA ConfigMap
pub fn registry_ca_key(instance: &UpdateService) -> &str {
    instance
        .spec
        .external_ca_config_map_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .unwrap_or(DEFAULT_CA_CERT_KEY)
}

/// Names of every object managed for one UpdateService
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    base: String,
}

impl ResourceNames {
    /// Names derived from an instance
    pub fn for_instance(instance: &UpdateService) -> Self {
        Self::new(instance.name_any())
    }

    /// Names derived from an instance name
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Deployment, PodDisruptionBudget and NetworkPolicy
    pub fn deployment(&self) -> String {
        self.base.clone()
    }

    /// Graph-builder configuration ConfigMap
    pub fn config(&self) -> String {
        format!("{}-config", self.base)
    }

    /// Environment ConfigMap
    pub fn env_config(&self) -> String {
        format!("{}-env", self.base)
    }

    pub fn graph_builder_service(&self) -> String {
        format!("{}-graph-builder", self.base)
    }

    pub fn policy_engine_service(&self) -> String {
        format!("{}-policy-engine", self.base)
    }

    /// Public policy-engine route
    pub fn route(&self) -> String {
        format!("{}-route", self.base)
    }

    /// Route name used by earlier operator releases
    pub fn legacy_route(&self) -> String {
        format!("{}-route", self.policy_engine_service())
    }

    /// Copy of the registry CA ConfigMap
    pub fn trusted_ca(&self) -> String {
        format!("{}-trusted-ca", self.base)
    }

    /// Copy of the cluster pull secret
    pub fn pull_secret(&self) -> String {
        format!("{}-{PULL_SECRET_NAME}", self.base)
    }

    /// Host label the router derives for the route: `<route>-<namespace>`
    pub fn route_host_label(&self, namespace: &str) -> String {
        format!("{}-{namespace}", self.route())
    }
}
