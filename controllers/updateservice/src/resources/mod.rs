//! Desired state of an UpdateService.
//!
//! [`DesiredStateBuilder::build`] turns one UpdateService and the external
//! objects it depends on into a [`DesiredStateBundle`]: every managed object,
//! fully rendered, each tagged with the merge policy the ensure engine
//! applies when the object already exists. Building is pure and either
//! yields the whole bundle or an error, before anything is written.

mod config;
mod network;
pub mod names;
mod workload;


pub use names::ResourceNames;
pub use workload::ContainerRole;

use crate::config::ProxyConfig;
use crate::error::ControllerError;
use crate::fingerprint::fingerprint;
use crds::{Route, UpdateService};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Which fields of an existing object the ensure engine takes over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// `data` only (ConfigMap, Secret)
    DataOnly,
    /// Ports, selector and type; server-assigned fields are kept
    Service,
    /// Deployment spec, container by container
    Workload,
    /// Whole spec except the user-editable TLS block
    RouteExceptTls,
    /// Whole spec (PodDisruptionBudget, NetworkPolicy)
    FullSpec,
    /// Created once, then left to whoever fills it in
    CreateOnly,
}

/// One managed object as it should exist
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor<K> {
    /// The rendered object; kind, namespace and name come from here
    pub payload: K,
    /// How to merge into an existing object
    pub policy: MergePolicy,
    /// Controller reference to the owning UpdateService
    pub owner: OwnerReference,
}

impl<K: Resource> Descriptor<K> {
    /// Object name
    pub fn name(&self) -> &str {
        self.payload.meta().name.as_deref().unwrap_or_default()
    }

    /// Object namespace
    pub fn namespace(&self) -> Option<&str> {
        self.payload.meta().namespace.as_deref()
    }
}

/// External objects the desired state depends on, found by the caller
#[derive(Debug, Clone, Default)]
pub struct ExternalDependencies {
    /// `openshift-config/pull-secret`
    pub pull_secret: Option<Secret>,
    /// The ConfigMap named by the cluster image config, if it holds the
    /// registry CA key
    pub trusted_ca: Option<ConfigMap>,
    /// `cluster-trusted-ca` in the instance namespace, if it holds an
    /// injected bundle. Only consulted when a proxy is configured.
    pub cluster_ca: Option<ConfigMap>,
}

/// Every managed object for one pass, in build order
#[derive(Debug, Clone)]
pub struct DesiredStateBundle {
    /// `<name>-config` with `gb.toml`
    pub graph_builder_config: Descriptor<ConfigMap>,
    /// Fingerprint of the graph-builder config data
    pub graph_builder_config_hash: String,
    /// `<name>-env`
    pub env_config: Descriptor<ConfigMap>,
    /// Fingerprint of the env config data
    pub env_config_hash: String,
    /// `<name>-trusted-ca`, when a registry CA was found
    pub trusted_ca: Option<Descriptor<ConfigMap>>,
    /// `cluster-trusted-ca`, when a proxy is configured
    pub cluster_ca: Option<Descriptor<ConfigMap>>,
    /// `<name>-pull-secret`, when the cluster pull secret was found
    pub pull_secret: Option<Descriptor<Secret>>,
    pub graph_builder_service: Descriptor<Service>,
    pub policy_engine_service: Descriptor<Service>,
    pub pod_disruption_budget: Descriptor<PodDisruptionBudget>,
    pub network_policy: Descriptor<NetworkPolicy>,
    /// `<name>-route`
    pub route: Descriptor<Route>,
    /// Route name from earlier releases, converged in place if it exists
    pub legacy_route_name: String,
    pub deployment: Descriptor<Deployment>,
    /// Tag-to-digest resolver pod, when graph data comes from a tag
    pub graph_data_digest_pod: Option<Descriptor<Pod>>,
}

/// Renders the desired state of UpdateService instances
#[derive(Debug, Clone)]
pub struct DesiredStateBuilder {
    operand_image: String,
    proxy: ProxyConfig,
}

/// Per-build context shared by the renderers
#[derive(Debug)]
pub(crate) struct RenderContext<'a> {
    pub instance: &'a UpdateService,
    pub names: ResourceNames,
    pub namespace: String,
    pub owner: OwnerReference,
    pub operand_image: &'a str,
    pub proxy: &'a ProxyConfig,
}

impl RenderContext<'_> {
    /// Object metadata with a name, the instance namespace and a description
    pub fn meta(&self, name: String, description: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            annotations: Some(BTreeMap::from([(
                names::DESCRIPTION_ANNOTATION.to_string(),
                description.to_string(),
            )])),
            ..Default::default()
        }
    }

    /// Wrap a payload with this instance as owner
    pub fn describe<K>(&self, payload: K, policy: MergePolicy) -> Descriptor<K> {
        Descriptor {
            payload,
            policy,
            owner: self.owner.clone(),
        }
    }

    /// Key of the registry CA certificate in the trusted CA ConfigMap
    pub fn ca_cert_key(&self) -> &str {
        names::registry_ca_key(self.instance)
    }
}

/// Split `registry/repository` on the first `/`
pub fn split_releases(releases: &str) -> Result<(&str, &str), ControllerError> {
    match releases.split_once('/') {
        Some((registry, repository)) if !registry.is_empty() && !repository.is_empty() => {
            Ok((registry, repository))
        }
        _ => Err(ControllerError::InvalidSpec(format!(
            "failed to split {releases:?} into registry and repository components"
        ))),
    }
}

impl DesiredStateBuilder {
    /// Builder for a given operand image and proxy environment
    pub fn new(operand_image: impl Into<String>, proxy: ProxyConfig) -> Self {
        Self {
            operand_image: operand_image.into(),
            proxy,
        }
    }

    /// Render every managed object for `instance`
    pub fn build(
        &self,
        instance: &UpdateService,
        deps: &ExternalDependencies,
    ) -> Result<DesiredStateBundle, ControllerError> {
        let (registry, repository) = split_releases(&instance.spec.releases)?;
        let namespace = instance.namespace().ok_or_else(|| {
            ControllerError::MissingOwner(format!("UpdateService {} has no namespace", instance.name_any()))
        })?;
        let owner = instance.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::MissingOwner(format!("UpdateService {} has no uid", instance.name_any()))
        })?;
        let ctx = RenderContext {
            instance,
            names: ResourceNames::for_instance(instance),
            namespace,
            owner,
            operand_image: &self.operand_image,
            proxy: &self.proxy,
        };

        let graph_builder_config = config::graph_builder_config(&ctx, registry, repository);
        let graph_builder_config_hash = fingerprint(&config_data(&graph_builder_config.payload));
        let env_config = config::env_config(&ctx);
        let env_config_hash = fingerprint(&config_data(&env_config.payload));
        let trusted_ca = deps.trusted_ca.as_ref().map(|cm| config::trusted_ca(&ctx, cm));
        let cluster_ca = self
            .proxy
            .is_configured()
            .then(|| config::cluster_ca(&ctx, deps.cluster_ca.as_ref()));
        let pull_secret = deps.pull_secret.as_ref().map(|s| config::pull_secret(&ctx, s));

        let volumes = workload::volumes(&ctx, trusted_ca.is_some(), cluster_ca.is_some());
        let containers = workload::containers(&ctx, trusted_ca.is_some(), cluster_ca.is_some());
        let deployment = workload::deployment(
            &ctx,
            volumes,
            containers,
            &graph_builder_config_hash,
            &env_config_hash,
        );

        Ok(DesiredStateBundle {
            graph_builder_config,
            graph_builder_config_hash,
            env_config,
            env_config_hash,
            trusted_ca,
            cluster_ca,
            pull_secret,
            graph_builder_service: network::graph_builder_service(&ctx),
            policy_engine_service: network::policy_engine_service(&ctx),
            pod_disruption_budget: network::pod_disruption_budget(&ctx),
            network_policy: network::network_policy(&ctx),
            route: network::route(&ctx),
            legacy_route_name: ctx.names.legacy_route(),
            deployment,
            graph_data_digest_pod: workload::graph_data_digest_pod(&ctx),
        })
    }
}

fn config_data(cm: &ConfigMap) -> BTreeMap<String, String> {
    cm.data.clone().unwrap_or_default()
}
