//! ObjectStore trait
//!
//! Abstracts the cluster API so the reconciliation engine can run against
//! the real API server ([`crate::KubeStore`]) or an in-memory fake.

use crate::error::StoreError;
use crate::object::StoreObject;

/// Trait for cluster object operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// `namespace` is ignored for cluster-scoped kinds.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get one object; `StoreError::NotFound` when absent
    async fn get<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError>;

    /// List objects in a namespace, or across all namespaces when `None`
    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError>;

    /// Create an object; `StoreError::AlreadyExists` when the name is taken
    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object.
    ///
    /// The object's `resourceVersion` is sent along, so a stale copy fails
    /// with `StoreError::Conflict` instead of overwriting a concurrent edit.
    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Delete an object
    async fn delete<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError>;

    /// Write the status subresource of an object
    async fn update_status<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<K, StoreError>;

    /// Get one object, mapping NotFound to `None`
    async fn find<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, StoreError> {
        match self.get::<K>(namespace, name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
