//! In-memory ObjectStore for unit testing
//!
//! This module provides a fake implementation of [`ObjectStore`] that can be
//! used in unit tests without a running API server. It imitates the parts of
//! API server behaviour the reconciler depends on: `resourceVersion`
//! optimistic concurrency, server-assigned Service `clusterIP`, and status
//! being preserved across plain updates.

use crate::error::StoreError;
use crate::object::StoreObject;
use crate::store::ObjectStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store operations, for call accounting and error injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// `get`
    Get,
    /// `list`
    List,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `update_status`
    UpdateStatus,
}

impl StoreOp {
    /// Whether the operation mutates the store
    pub fn is_write(self) -> bool {
        !matches!(self, StoreOp::Get | StoreOp::List)
    }
}

/// A recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Operation performed
    pub op: StoreOp,
    /// Kind addressed
    pub kind: String,
    /// Namespace addressed (empty for cluster scope or all namespaces)
    pub namespace: String,
    /// Object name (empty for `list`)
    pub name: String,
}

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    calls: Vec<StoreCall>,
    failures: Vec<(StoreOp, String, StoreError)>,
    next_version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_failure(&mut self, op: StoreOp, kind: &str) -> Option<StoreError> {
        let index = self
            .failures
            .iter()
            .position(|(o, k, _)| *o == op && k == kind)?;
        Some(self.failures.remove(index).2)
    }
}

/// In-memory object store for testing
///
/// Objects are kept as JSON keyed by kind, namespace and name. Every call is
/// recorded; successful writes can be counted with [`MemoryStore::writes`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object (for test setup). Not recorded as a call.
    pub fn insert<K: StoreObject>(&self, obj: K) {
        let mut state = self.lock();
        let key = key_for(&obj);
        let mut value = match serde_json::to_value(&obj) {
            Ok(v) => v,
            Err(e) => panic!("cannot serialize seeded {}: {e}", K::kind_name()),
        };
        let version = state.next_version();
        stamp_server_fields(&mut value, &version, &K::kind_name(), true);
        state.objects.insert(key, value);
    }

    /// Read an object back (for assertions). Not recorded as a call.
    pub fn object<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let state = self.lock();
        state
            .objects
            .get(&make_key::<K>(namespace, name))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Make the next `op` on `K` fail with `err`. One-shot.
    pub fn fail_next<K: StoreObject>(&self, op: StoreOp, err: StoreError) {
        self.lock().failures.push((op, K::kind_name(), err));
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Successful writes, in order
    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls().into_iter().filter(|c| c.op.is_write()).collect()
    }

    /// Successful writes of one kind
    pub fn writes_of<K: StoreObject>(&self) -> Vec<StoreCall> {
        let kind = K::kind_name();
        self.writes().into_iter().filter(|c| c.kind == kind).collect()
    }

    /// Forget recorded calls (objects are kept)
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn make_key<K: StoreObject>(namespace: Option<&str>, name: &str) -> ObjectKey {
    let ns = if K::NAMESPACED { namespace.unwrap_or_default() } else { "" };
    (K::kind_name(), ns.to_string(), name.to_string())
}

fn key_for<K: StoreObject>(obj: &K) -> ObjectKey {
    let meta = obj.meta();
    make_key::<K>(meta.namespace.as_deref(), meta.name.as_deref().unwrap_or_default())
}

fn record(state: &mut State, op: StoreOp, key: &ObjectKey) {
    state.calls.push(StoreCall {
        op,
        kind: key.0.clone(),
        namespace: key.1.clone(),
        name: key.2.clone(),
    });
}

fn stamp_server_fields(value: &mut Value, version: &str, kind: &str, created: bool) {
    value["metadata"]["resourceVersion"] = Value::String(version.to_string());
    if created {
        if value["metadata"]["uid"].is_null() {
            value["metadata"]["uid"] = Value::String(format!("uid-{version}"));
        }
        if kind == "Service" && value["spec"]["clusterIP"].is_null() {
            value["spec"]["clusterIP"] = Value::String(format!("172.30.0.{version}"));
        }
    }
}

fn validate_name<K: StoreObject>(obj: &K) -> Result<(), StoreError> {
    let meta = obj.meta();
    if meta.name.as_deref().unwrap_or_default().is_empty() {
        return Err(StoreError::InvalidObject(format!("{} without metadata.name", K::kind_name())));
    }
    if K::NAMESPACED && meta.namespace.as_deref().unwrap_or_default().is_empty() {
        return Err(StoreError::InvalidObject(format!("{} without metadata.namespace", K::kind_name())));
    }
    Ok(())
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError> {
        let mut state = self.lock();
        let key = make_key::<K>(namespace, name);
        record(&mut state, StoreOp::Get, &key);
        if let Some(err) = state.take_failure(StoreOp::Get, &key.0) {
            return Err(err);
        }
        let value = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {}/{}", key.0, key.1, key.2)))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let mut state = self.lock();
        let kind = K::kind_name();
        let ns = namespace.filter(|_| K::NAMESPACED);
        record(
            &mut state,
            StoreOp::List,
            &(kind.clone(), ns.unwrap_or_default().to_string(), String::new()),
        );
        if let Some(err) = state.take_failure(StoreOp::List, &kind) {
            return Err(err);
        }
        state
            .objects
            .iter()
            .filter(|((k, n, _), _)| *k == kind && ns.is_none_or(|ns| n == ns))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        validate_name(obj)?;
        let mut state = self.lock();
        let key = key_for(obj);
        if let Some(err) = state.take_failure(StoreOp::Create, &key.0) {
            return Err(err);
        }
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{} {}/{}", key.0, key.1, key.2)));
        }
        let mut value = serde_json::to_value(obj)?;
        let version = state.next_version();
        stamp_server_fields(&mut value, &version, &key.0, true);
        let created = serde_json::from_value(value.clone())?;
        state.objects.insert(key.clone(), value);
        record(&mut state, StoreOp::Create, &key);
        Ok(created)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        validate_name(obj)?;
        let mut state = self.lock();
        let key = key_for(obj);
        if let Some(err) = state.take_failure(StoreOp::Update, &key.0) {
            return Err(err);
        }
        let stored = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}/{}", key.0, key.1, key.2)))?;
        let stored_version = stored["metadata"]["resourceVersion"].as_str().unwrap_or_default();
        if let Some(sent) = obj.meta().resource_version.as_deref() {
            if sent != stored_version {
                return Err(StoreError::Conflict(format!(
                    "{} {}/{}: resourceVersion {sent} is stale, current is {stored_version}",
                    key.0, key.1, key.2
                )));
            }
        }
        let status = stored.get("status").cloned();
        let mut value = serde_json::to_value(obj)?;
        if let Some(status) = status {
            value["status"] = status;
        }
        let version = state.next_version();
        stamp_server_fields(&mut value, &version, &key.0, false);
        let updated = serde_json::from_value(value.clone())?;
        state.objects.insert(key.clone(), value);
        record(&mut state, StoreOp::Update, &key);
        Ok(updated)
    }

    async fn delete<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let key = make_key::<K>(namespace, name);
        if let Some(err) = state.take_failure(StoreOp::Delete, &key.0) {
            return Err(err);
        }
        state
            .objects
            .remove(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}/{}", key.0, key.1, key.2)))?;
        record(&mut state, StoreOp::Delete, &key);
        Ok(())
    }

    async fn update_status<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &Value,
    ) -> Result<K, StoreError> {
        let mut state = self.lock();
        let key = make_key::<K>(namespace, name);
        if let Some(err) = state.take_failure(StoreOp::UpdateStatus, &key.0) {
            return Err(err);
        }
        let version = state.next_version();
        let value = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}/{}", key.0, key.1, key.2)))?;
        value["status"] = status.clone();
        stamp_server_fields(value, &version, &key.0, false);
        let updated = serde_json::from_value(value.clone())?;
        record(&mut state, StoreOp::UpdateStatus, &key);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str, ns: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            data: Some([("k".to_string(), "v".to_string())].into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a", "ns")).await.unwrap();
        assert!(created.metadata.resource_version.is_some());
        let found: ConfigMap = store.get(Some("ns"), "a").await.unwrap();
        assert_eq!(found, created);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_create_existing_is_already_exists() {
        let store = MemoryStore::new();
        store.insert(config_map("a", "ns"));
        let err = store.create(&config_map("a", "ns")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MemoryStore::new();
        let first = store.create(&config_map("a", "ns")).await.unwrap();
        let mut second = first.clone();
        second.data = Some([("k".to_string(), "w".to_string())].into());
        store.update(&second).await.unwrap();

        let err = store.update(&first).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_service_gets_cluster_ip() {
        let store = MemoryStore::new();
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("svc".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec::default()),
            ..Default::default()
        };
        let created = store.create(&svc).await.unwrap();
        assert!(created.spec.unwrap().cluster_ip.is_some());
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = MemoryStore::new();
        store.insert(config_map("a", "ns"));
        store.fail_next::<ConfigMap>(StoreOp::Get, StoreError::Conflict("boom".to_string()));
        assert!(store.get::<ConfigMap>(Some("ns"), "a").await.is_err());
        assert!(store.get::<ConfigMap>(Some("ns"), "a").await.is_ok());
    }

    #[tokio::test]
    async fn test_find_maps_not_found_to_none() {
        let store = MemoryStore::new();
        let found: Option<ConfigMap> = store.find(Some("ns"), "missing").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_namespace() {
        let store = MemoryStore::new();
        store.insert(config_map("a", "ns1"));
        store.insert(config_map("b", "ns2"));
        let in_ns1: Vec<ConfigMap> = store.list(Some("ns1")).await.unwrap();
        assert_eq!(in_ns1.len(), 1);
        let all: Vec<ConfigMap> = store.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
