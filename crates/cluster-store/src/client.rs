//! Kubernetes-backed object store

use crate::error::StoreError;
use crate::object::StoreObject;
use crate::store::ObjectStore;
use kube::Client;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Object store backed by the Kubernetes API server.
///
/// Every call is bounded by `call_timeout`; a call that exceeds it fails
/// with `StoreError::Timeout` and the in-flight request is dropped.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    call_timeout: Duration,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Create a store from a kube client
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self { client, call_timeout }
    }

    /// The underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_elapsed) => Err(StoreError::Timeout {
                op,
                after: self.call_timeout,
            }),
        }
    }
}

fn object_name<K: StoreObject>(obj: &K) -> Result<&str, StoreError> {
    obj.meta()
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} without metadata.name", K::kind_name())))
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError> {
        let api = K::api(self.client.clone(), namespace);
        self.bounded("get", api.get(name)).await
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let api = K::api(self.client.clone(), namespace);
        let list = self.bounded("list", api.list(&ListParams::default())).await?;
        Ok(list.items)
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let api = K::api(self.client.clone(), obj.meta().namespace.as_deref());
        debug!("Creating {} {}", K::kind_name(), object_name(obj)?);
        self.bounded("create", api.create(&PostParams::default(), obj)).await
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let name = object_name(obj)?;
        let api = K::api(self.client.clone(), obj.meta().namespace.as_deref());
        debug!("Replacing {} {}", K::kind_name(), name);
        self.bounded("update", api.replace(name, &PostParams::default(), obj)).await
    }

    async fn delete<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        let api = K::api(self.client.clone(), namespace);
        self.bounded("delete", api.delete(name, &DeleteParams::default()))
            .await
            .map(|_| ())
    }

    async fn update_status<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<K, StoreError> {
        let api = K::api(self.client.clone(), namespace);
        let status_patch = serde_json::json!({
            "status": status
        });
        let pp = PatchParams::default();
        self.bounded("update_status", api.patch_status(name, &pp, &Patch::Merge(&status_patch)))
            .await
    }
}
