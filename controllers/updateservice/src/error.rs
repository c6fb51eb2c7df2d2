//! Controller-specific error types.
//!
//! This module defines error types specific to the UpdateService Controller
//! that are not covered by upstream library errors.

use cluster_store::StoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the UpdateService Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error (client construction, watch plumbing)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// UpdateService spec cannot be rendered
    #[error("Invalid UpdateService spec: {0}")]
    InvalidSpec(String),

    /// The cluster pull secret is missing
    #[error("Pull secret not found: {0}")]
    MissingPullSecret(String),

    /// An expected init container is absent after merging the deployment
    #[error("Init container not found: {0}")]
    MissingInitContainer(String),

    /// The UpdateService lacks the metadata needed to own other objects
    #[error("Cannot reference owner: {0}")]
    MissingOwner(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the error is a create that lost a race with another writer
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_already_exists())
    }
}
