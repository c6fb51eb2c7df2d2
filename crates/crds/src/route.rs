//! OpenShift Route (`route.openshift.io/v1`)
//!
//! Only the fields the operator produces or reads are modelled; anything else
//! in the spec or TLS block is carried through untouched. The route is
//! created by the operator but its TLS block is user-editable afterwards, and
//! its host and status are assigned by the router.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    status = "RouteStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// External hostname; assigned by the router when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Path the router matches on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Backend the route points to
    pub to: RouteTargetReference,

    /// Backend port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    /// TLS termination settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Wildcard policy (`None` or `Subdomain`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard_policy: Option<String>,

    /// Spec fields not modelled above
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    /// Backend kind, always `Service`
    pub kind: String,

    /// Backend name
    pub name: String,

    /// Relative weight of this backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    /// Service port, by number or by name
    pub target_port: RouteTargetPort,
}

/// A port given either by number or by name
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum RouteTargetPort {
    /// Numeric port
    Int(i32),

    /// Named port
    Name(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// `edge`, `passthrough` or `reencrypt`
    pub termination: String,

    /// What to do with plain HTTP traffic (`None`, `Allow`, `Redirect`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ca_certificate: Option<String>,

    /// TLS settings not modelled above, e.g. `externalCertificate`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    /// Per-router admission state
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    /// Host the router exposes the route on
    #[serde(default)]
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_name: Option<String>,

    #[serde(default)]
    pub conditions: Vec<RouteIngressCondition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngressCondition {
    /// Condition type; `Admitted` is the only one routers report
    #[serde(rename = "type")]
    pub type_: String,

    /// `True`, `False` or `Unknown`
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RouteIngress {
    /// Whether this router has admitted the route
    pub fn is_admitted(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == "Admitted" && c.status == "True")
    }
}

impl Route {
    /// External URI of the first admitted ingress.
    ///
    /// The scheme is `https` when the route terminates TLS; the route path is
    /// appended as-is. Returns `None` until a router admits the route.
    pub fn ingress_uri(&self) -> Option<String> {
        let ingress = self
            .status
            .as_ref()?
            .ingress
            .iter()
            .find(|i| i.is_admitted() && !i.host.is_empty())?;
        let scheme = if self.spec.tls.is_some() { "https" } else { "http" };
        let path = self.spec.path.as_deref().unwrap_or_default();
        Some(format!("{scheme}://{}{path}", ingress.host))
    }
}
