//! External dependency lookups.
//!
//! Only the pull secret is required. The CA lookups never fail the pass on a
//! missing object: they record why on `RegistryCACertFound` and let the
//! deployment render without the CA volume.

use crate::conditions::ConditionTracker;
use crate::error::ControllerError;
use crate::resources::names::{
    CLUSTER_CA_CERT_KEY, CLUSTER_CA_CONFIG_MAP, OPENSHIFT_CONFIG_NAMESPACE, PULL_SECRET_NAME,
};
use cluster_store::ObjectStore;
use crds::{Image, IMAGE_CONFIG_NAME};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use tracing::{info, warn};

fn has_key(cm: &ConfigMap, key: &str) -> bool {
    cm.data.as_ref().is_some_and(|data| data.contains_key(key))
}

/// Locate the cluster pull secret in `openshift-config`
pub(super) async fn find_pull_secret<S: ObjectStore>(
    store: &S,
    tracker: &mut ConditionTracker,
) -> Result<Secret, ControllerError> {
    match store.find::<Secret>(Some(OPENSHIFT_CONFIG_NAMESPACE), PULL_SECRET_NAME).await? {
        Some(secret) => Ok(secret),
        None => {
            let message = format!("Secret {OPENSHIFT_CONFIG_NAMESPACE}/{PULL_SECRET_NAME} not found");
            tracker.fail("PullSecretNotFound", &message);
            Err(ControllerError::MissingPullSecret(message))
        }
    }
}

/// Locate the registry CA ConfigMap named by the cluster image config.
///
/// Returns the ConfigMap only when it carries `ca_key`.
pub(super) async fn find_trusted_ca<S: ObjectStore>(
    store: &S,
    ca_key: &str,
    tracker: &mut ConditionTracker,
) -> Result<Option<ConfigMap>, ControllerError> {
    let Some(image) = store.find::<Image>(None, IMAGE_CONFIG_NAME).await? else {
        let message = format!("image.config.openshift.io not found for name {IMAGE_CONFIG_NAME}");
        info!("{}", message);
        tracker.ca_not_found("FindAdditionalTrustedCAFailed", &message);
        return Ok(None);
    };

    let Some(name) = image.trusted_ca_name() else {
        let message = format!(
            "image.config.openshift.io.Spec.AdditionalTrustedCA.Name not set for image name {IMAGE_CONFIG_NAME}"
        );
        info!("{}", message);
        tracker.ca_not_found("NotConfigured", &message);
        return Ok(None);
    };

    let Some(cm) = store.find::<ConfigMap>(Some(OPENSHIFT_CONFIG_NAMESPACE), name).await? else {
        let message = format!(
            "Found image.config.openshift.io.Spec.AdditionalTrustedCA.Name but did not find expected \
             ConfigMap (Name: {name}, Namespace: {OPENSHIFT_CONFIG_NAMESPACE})"
        );
        warn!("{}", message);
        tracker.ca_not_found("FindAdditionalTrustedCAFailed", &message);
        return Ok(None);
    };

    if !has_key(&cm, ca_key) {
        let message = format!(
            "Found ConfigMap referenced by ImageConfig.Spec.AdditionalTrustedCA.Name but did not find key \
             '{ca_key}' for registry CA cert in ConfigMap (Name: {name}, Namespace: {OPENSHIFT_CONFIG_NAMESPACE})"
        );
        warn!("{}", message);
        tracker.ca_not_found("EnsureAdditionalTrustedCAFailed", &message);
        return Ok(None);
    }
    Ok(Some(cm))
}

/// Locate the proxy CA bundle injected into the instance namespace.
///
/// `None` when it does not exist yet or has not been populated; the pass then
/// requests injection.
pub(super) async fn find_cluster_ca<S: ObjectStore>(
    store: &S,
    namespace: &str,
    tracker: &mut ConditionTracker,
) -> Result<Option<ConfigMap>, ControllerError> {
    let Some(cm) = store.find::<ConfigMap>(Some(namespace), CLUSTER_CA_CONFIG_MAP).await? else {
        return Ok(None);
    };
    if !has_key(&cm, CLUSTER_CA_CERT_KEY) {
        let message = format!("Found cluster-wide CA but required key: '{CLUSTER_CA_CERT_KEY}' not found");
        info!("{}", message);
        tracker.ca_not_found("EnsureTrustedClusterCAFailed", &message);
        return Ok(None);
    }
    Ok(Some(cm))
}
