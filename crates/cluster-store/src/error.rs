//! Object store errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when reading or writing cluster objects
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create raced with another writer
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency failure on update
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The call did not complete before its deadline
    #[error("{op} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        op: &'static str,
        /// Deadline that was exceeded
        after: Duration,
    },

    /// Object cannot be addressed (missing name, wrong scope)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),
}

impl StoreError {
    /// Whether the object was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether a create lost a race with another writer
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        if let kube::Error::Api(ae) = &err {
            match ae.code {
                404 => return StoreError::NotFound(ae.message.clone()),
                409 if ae.reason == "AlreadyExists" => {
                    return StoreError::AlreadyExists(ae.message.clone());
                }
                409 => return StoreError::Conflict(ae.message.clone()),
                _ => {}
            }
        }
        StoreError::Kube(err)
    }
}
