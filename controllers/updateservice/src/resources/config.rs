//! ConfigMaps and Secrets

use super::names::{CLUSTER_CA_CONFIG_MAP, DESCRIPTION_ANNOTATION};
use super::{Descriptor, MergePolicy, RenderContext};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

const GRAPH_BUILDER_TOML: &str = r#"verbosity = "vvv"

[service]
pause_secs = 300
address = "::"
port = 8080

[status]
address = "::"
port = 9080

[[plugin_settings]]
name = "release-scrape-dockerv2"
registry = "{registry}"
repository = "{repository}"
fetch_concurrency = 16
credentials_path = "/var/lib/cincinnati/registry-credentials/.dockerconfigjson"

[[plugin_settings]]
name = "openshift-secondary-metadata-parse"
data_directory = "/var/lib/cincinnati/graph-data"

[[plugin_settings]]
name = "edge-add-remove""#;

/// Environment shared by the operand containers, read through
/// `configMapKeyRef`s
const ENV_CONFIG: [(&str, &str); 8] = [
    ("gb.rust_backtrace", "0"),
    ("pe.address", "::"),
    ("pe.log.verbosity", "vv"),
    ("pe.mandatory_client_parameters", "channel"),
    ("pe.rust_backtrace", "0"),
    ("pe.status.address", "::"),
    ("pe.upstream", "http://localhost:8080/v1/graph"),
    ("m.rust_backtrace", "0"),
];

/// Render the graph-builder TOML for a release repository
pub(crate) fn render_graph_builder_toml(registry: &str, repository: &str) -> String {
    GRAPH_BUILDER_TOML
        .replace("{registry}", registry)
        .replace("{repository}", repository)
}

pub(crate) fn graph_builder_config(
    ctx: &RenderContext<'_>,
    registry: &str,
    repository: &str,
) -> Descriptor<ConfigMap> {
    let cm = ConfigMap {
        metadata: ctx.meta(
            ctx.names.config(),
            "This ConfigMap contains the configuration file for the graph-builder",
        ),
        data: Some(BTreeMap::from([(
            "gb.toml".to_string(),
            render_graph_builder_toml(registry, repository),
        )])),
        ..Default::default()
    };
    ctx.describe(cm, MergePolicy::DataOnly)
}

pub(crate) fn env_config(ctx: &RenderContext<'_>) -> Descriptor<ConfigMap> {
    let cm = ConfigMap {
        metadata: ctx.meta(
            ctx.names.env_config(),
            "This ConfigMap contains the environment information shared by the containers of UpdateService",
        ),
        data: Some(
            ENV_CONFIG
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..Default::default()
    };
    ctx.describe(cm, MergePolicy::DataOnly)
}

/// Copy of the registry CA ConfigMap into the instance namespace
pub(crate) fn trusted_ca(ctx: &RenderContext<'_>, source: &ConfigMap) -> Descriptor<ConfigMap> {
    let cm = ConfigMap {
        metadata: ctx.meta(
            ctx.names.trusted_ca(),
            "This ConfigMap contains additional certificate authorities to be trusted during image registry access.",
        ),
        data: source.data.clone(),
        ..Default::default()
    };
    ctx.describe(cm, MergePolicy::DataOnly)
}

/// Request for the platform to inject the proxy CA bundle.
///
/// The platform fills `ca-bundle.crt` into any ConfigMap carrying the
/// inject label, so the operator only creates it and never touches the
/// content afterwards.
pub(crate) fn cluster_ca(ctx: &RenderContext<'_>, found: Option<&ConfigMap>) -> Descriptor<ConfigMap> {
    let cm = match found {
        Some(found) => ConfigMap {
            metadata: ObjectMeta {
                name: Some(CLUSTER_CA_CONFIG_MAP.to_string()),
                namespace: Some(ctx.namespace.clone()),
                labels: found.metadata.labels.clone(),
                annotations: found.metadata.annotations.clone(),
                ..Default::default()
            },
            data: found.data.clone(),
            ..Default::default()
        },
        None => ConfigMap {
            metadata: ObjectMeta {
                name: Some(CLUSTER_CA_CONFIG_MAP.to_string()),
                namespace: Some(ctx.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    "config.openshift.io/inject-trusted-cabundle".to_string(),
                    "true".to_string(),
                )])),
                annotations: Some(BTreeMap::from([
                    ("release.openshift.io/create-only".to_string(), "true".to_string()),
                    (
                        DESCRIPTION_ANNOTATION.to_string(),
                        "The cluster proxy CA bundle is injected into this ConfigMap by the platform".to_string(),
                    ),
                ])),
                ..Default::default()
            },
            ..Default::default()
        },
    };
    ctx.describe(cm, MergePolicy::CreateOnly)
}

/// Copy of the cluster pull secret into the instance namespace
pub(crate) fn pull_secret(ctx: &RenderContext<'_>, source: &Secret) -> Descriptor<Secret> {
    let secret = Secret {
        metadata: ctx.meta(
            ctx.names.pull_secret(),
            "It contains the pull credentials from the global pull secret for the cluster",
        ),
        data: source.data.clone(),
        type_: source.type_.clone(),
        ..Default::default()
    };
    ctx.describe(secret, MergePolicy::DataOnly)
}
