//! Reconciliation of UpdateService instances.
//!
//! One pass gathers the external dependencies, renders the whole desired
//! state, then ensures each managed object in a fixed order. The first
//! failing step ends the pass. Conditions are rebuilt from scratch every
//! pass and written back only when the outcome differs from the last one.

mod dependencies;


use crate::conditions::ConditionTracker;
use crate::config::ControllerConfig;
use crate::ensure::{ConvergenceEngine, MergeOptions};
use crate::error::ControllerError;
use crate::resources::names::registry_ca_key;
use crate::resources::{DesiredStateBuilder, DesiredStateBundle, ExternalDependencies, ResourceNames};
use cluster_store::ObjectStore;
use crds::{ConditionStatus, ConditionType, Route, UpdateService, UpdateServiceStatus};
use regex::Regex;
use std::future::Future;
use tracing::{debug, error, info};

/// Longest DNS-1123 label the router accepts as a host component
const DNS1123_LABEL_MAX_LENGTH: usize = 63;
const DNS1123_LABEL_FMT: &str = "^[a-z]([-a-z0-9]*[a-z0-9])?$";

/// How a pass ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every managed object was ensured
    Converged,
    /// The instance cannot be served as specified; retrying will not help
    Rejected,
    /// The instance no longer exists
    Gone,
    /// The instance lives outside the watched namespace
    Ignored,
}

/// Reconciles UpdateService instances against an object store
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    engine: ConvergenceEngine<S>,
    builder: DesiredStateBuilder,
    watch_namespace: String,
    proxy_configured: bool,
    route_label: Regex,
}

impl<S: ObjectStore + Clone> Reconciler<S> {
    /// Create a reconciler from the controller configuration
    pub fn new(store: S, config: &ControllerConfig) -> Result<Self, ControllerError> {
        let route_label = Regex::new(DNS1123_LABEL_FMT)
            .map_err(|e| ControllerError::InvalidConfig(format!("route name pattern: {e}")))?;
        Ok(Self {
            engine: ConvergenceEngine::new(
                store.clone(),
                config.create_retry_delay,
                MergeOptions {
                    unknown_containers: config.unknown_containers,
                },
            ),
            store,
            builder: DesiredStateBuilder::new(config.operand_image.clone(), config.proxy.clone()),
            watch_namespace: config.watch_namespace.clone(),
            proxy_configured: config.proxy.is_configured(),
            route_label,
        })
    }

    /// Run one pass for the instance `namespace/name`.
    ///
    /// Status is written back whether the pass succeeds or fails; a failed
    /// status write is logged and does not change the result.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<PassOutcome, ControllerError> {
        if namespace != self.watch_namespace {
            info!(
                "Ignoring reconcile request for {}/{} outside of operator's namespace {}",
                namespace, name, self.watch_namespace
            );
            return Ok(PassOutcome::Ignored);
        }

        let Some(instance) = self.store.find::<UpdateService>(Some(namespace), name).await? else {
            debug!("UpdateService {}/{} not found, nothing to do", namespace, name);
            return Ok(PassOutcome::Gone);
        };
        info!("Reconciling UpdateService {}/{}", namespace, name);

        let previous = instance.status.clone().unwrap_or_default();
        let mut tracker = ConditionTracker::new(previous.conditions.clone());
        let mut policy_engine_uri = previous.policy_engine_uri.clone();

        let result = self
            .run_pass(&instance, namespace, &mut tracker, &mut policy_engine_uri)
            .await;
        match &result {
            Ok(outcome) => info!("UpdateService {}/{} pass finished: {:?}", namespace, name, outcome),
            Err(e) => error!("UpdateService {}/{} pass failed: {}", namespace, name, e),
        }

        self.write_status(namespace, name, &previous, tracker, policy_engine_uri)
            .await;
        result
    }

    async fn run_pass(
        &self,
        instance: &UpdateService,
        namespace: &str,
        tracker: &mut ConditionTracker,
        policy_engine_uri: &mut Option<String>,
    ) -> Result<PassOutcome, ControllerError> {
        let names = ResourceNames::for_instance(instance);
        if let Err(message) = self.validate_route_name(&names, namespace) {
            error!("Unable to create UpdateService route: {}", message);
            tracker.fail("InvalidRouteName", &message);
            return Ok(PassOutcome::Rejected);
        }

        let pull_secret = dependencies::find_pull_secret(&self.store, tracker).await?;
        let trusted_ca = dependencies::find_trusted_ca(&self.store, registry_ca_key(instance), tracker).await?;
        let cluster_ca = if self.proxy_configured {
            dependencies::find_cluster_ca(&self.store, namespace, tracker).await?
        } else {
            None
        };
        let deps = ExternalDependencies {
            pull_secret: Some(pull_secret),
            trusted_ca,
            cluster_ca,
        };

        let bundle = self.builder.build(instance, &deps).inspect_err(|e| {
            tracker.fail("RenderFailed", &e.to_string());
        })?;

        tracker.set(
            ConditionType::ReconcileCompleted,
            ConditionStatus::False,
            "ReconcileStarted",
            "",
        );
        let route = self.ensure_all(&bundle, tracker).await?;
        tracker.set(ConditionType::ReconcileCompleted, ConditionStatus::True, "Success", "");

        match route.ingress_uri() {
            Some(uri) => *policy_engine_uri = Some(uri),
            None => debug!("Route {} not admitted yet", names.route()),
        }
        Ok(PassOutcome::Converged)
    }

    /// Ensure every managed object in order, returning the converged route
    async fn ensure_all(
        &self,
        bundle: &DesiredStateBundle,
        tracker: &mut ConditionTracker,
    ) -> Result<Route, ControllerError> {
        let engine = &self.engine;

        step(tracker, "EnsureConfigMapFailed", engine.ensure(&bundle.graph_builder_config)).await?;
        if let Some(pull_secret) = &bundle.pull_secret {
            step(tracker, "EnsureSecretFailed", engine.ensure(pull_secret)).await?;
        }
        step(tracker, "EnsureConfigMapFailed", engine.ensure(&bundle.env_config)).await?;
        if let Some(cluster_ca) = &bundle.cluster_ca {
            step(tracker, "EnsureConfigMapFailedForClusterCA", engine.ensure(cluster_ca)).await?;
        }
        if let Some(trusted_ca) = &bundle.trusted_ca {
            tracker.set(
                ConditionType::RegistryCACertFound,
                ConditionStatus::True,
                "CACertFound",
                "",
            );
            step(tracker, "EnsureConfigMapFailed", engine.ensure(trusted_ca)).await?;
        }
        step(tracker, "EnsureServiceFailed", engine.ensure(&bundle.graph_builder_service)).await?;
        step(tracker, "EnsureServiceFailed", engine.ensure(&bundle.policy_engine_service)).await?;
        step(tracker, "EnsurePDBFailed", engine.ensure(&bundle.pod_disruption_budget)).await?;
        step(tracker, "EnsureNetworkPolicyFailed", engine.ensure(&bundle.network_policy)).await?;
        let route = step(
            tracker,
            "EnsureRouteFailed",
            engine.ensure_route(&bundle.route, &bundle.legacy_route_name),
        )
        .await?;

        let mut deployment = bundle.deployment.clone();
        if let Some(image_id) = self.graph_data_image_id(bundle).await {
            deployment.pin_graph_data_image(&image_id);
        }
        step(tracker, "EnsureDeploymentFailed", engine.ensure(&deployment)).await?;
        Ok(route)
    }

    /// Resolved graph-data image, when graph data comes from a tag.
    ///
    /// Failures only cost the pin for this pass; the Deployment is still
    /// ensured and keeps whatever image ID it was pinned to before.
    async fn graph_data_image_id(&self, bundle: &DesiredStateBundle) -> Option<String> {
        let resolver = bundle.graph_data_digest_pod.as_ref()?;
        match self.engine.resolve_image_digest(resolver).await {
            Ok(image_id) => image_id,
            Err(e) => {
                error!("Unable to resolve graph-data image digest: {}", e);
                None
            }
        }
    }

    /// The router builds the host from `<route>-<namespace>`, which must be a
    /// valid DNS-1123 label
    fn validate_route_name(&self, names: &ResourceNames, namespace: &str) -> Result<(), String> {
        let label = names.route_host_label(namespace);
        let mut reasons = Vec::new();
        if label.len() > DNS1123_LABEL_MAX_LENGTH {
            reasons.push(format!(
                "cannot exceed RFC 1123 maximum length of {DNS1123_LABEL_MAX_LENGTH}. \
                 Shorten the application name and/or namespace."
            ));
        }
        if !self.route_label.is_match(&label) {
            reasons.push(format!("has invalid format; must comply with {DNS1123_LABEL_FMT:?}."));
        }
        if reasons.is_empty() {
            return Ok(());
        }
        Err(format!("UpdateService route name {label:?} {}", reasons.join(" Route name ")))
    }

    async fn write_status(
        &self,
        namespace: &str,
        name: &str,
        previous: &UpdateServiceStatus,
        tracker: ConditionTracker,
        policy_engine_uri: Option<String>,
    ) {
        if tracker.unchanged() && previous.policy_engine_uri == policy_engine_uri {
            debug!("UpdateService {}/{} status unchanged", namespace, name);
            return;
        }
        let status = UpdateServiceStatus {
            conditions: tracker.into_conditions(),
            policy_engine_uri,
        };
        let value = match serde_json::to_value(&status) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to serialize status for UpdateService {}/{}: {}", namespace, name, e);
                return;
            }
        };
        if let Err(e) = self
            .store
            .update_status::<UpdateService>(Some(namespace), name, &value)
            .await
        {
            error!("Failed to update status for UpdateService {}/{}: {}", namespace, name, e);
        }
    }
}

/// Run one ensure step, recording `reason` on failure
async fn step<T>(
    tracker: &mut ConditionTracker,
    reason: &str,
    ensure: impl Future<Output = Result<T, ControllerError>>,
) -> Result<T, ControllerError> {
    ensure.await.inspect_err(|e| {
        error!("{}: {}", reason, e);
        tracker.fail(reason, &e.to_string());
    })
}
