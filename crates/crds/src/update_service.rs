//! UpdateService CRD
//!
//! Declares one OpenShift update service: a graph-builder plus policy-engine
//! deployment serving the upgrade graph for a release repository.

use crate::conditions::{Condition, ConditionType};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "updateservice.operator.openshift.io",
    version = "v1",
    kind = "UpdateService",
    namespaced,
    status = "UpdateServiceStatus",
    derive = "PartialEq",
    shortname = "us"
)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceSpec {
    /// Number of policy-engine/graph-builder pods
    #[schemars(range(min = 1))]
    pub replicas: i32,

    /// Release image repository, as `registry/repository`
    /// (e.g. `quay.io/openshift-release-dev/ocp-release`)
    pub releases: String,

    /// Container image carrying the graph data, copied into the pod by an
    /// init container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_data_image: Option<String>,

    /// Key under which the registry CA certificate is stored in the
    /// ConfigMap named by `image.config.openshift.io/cluster`
    /// (defaults to `updateservice-registry`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ca_config_map_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceStatus {
    /// Reconciliation conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// External URI of the policy engine, discovered from the admitted route
    #[serde(rename = "policyEngineURI", default, skip_serializing_if = "Option::is_none")]
    pub policy_engine_uri: Option<String>,
}

impl UpdateServiceStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
