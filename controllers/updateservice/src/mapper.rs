//! Maps changes of unowned dependencies to reconcile requests.
//!
//! The registry CA ConfigMap and the cluster image config are not owned by
//! any UpdateService, so owner references cannot route their events. A
//! relevant event requeues every instance in the watched namespace; anything
//! else, including lookup failures, maps to no requests.

use cluster_store::ObjectStore;
use crate::resources::names::OPENSHIFT_CONFIG_NAMESPACE;
use crds::{Image, UpdateService, IMAGE_CONFIG_NAME};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use kube_runtime::reflector::ObjectRef;
use tracing::{debug, error};

/// Resolves dependency events to the instances that consume them
#[derive(Debug, Clone)]
pub struct DependencyMapper<S> {
    store: S,
    watch_namespace: String,
}

impl<S: ObjectStore> DependencyMapper<S> {
    /// Create a mapper listing instances in `watch_namespace`
    pub fn new(store: S, watch_namespace: impl Into<String>) -> Self {
        Self {
            store,
            watch_namespace: watch_namespace.into(),
        }
    }

    /// Requests for a ConfigMap event.
    ///
    /// Relevant only for the ConfigMap in `openshift-config` currently named
    /// by the cluster image config as the additional trusted CA.
    pub async fn map_config_map(&self, cm: &ConfigMap) -> Vec<ObjectRef<UpdateService>> {
        if cm.namespace().as_deref() != Some(OPENSHIFT_CONFIG_NAMESPACE) {
            return Vec::new();
        }
        let image = match self.store.find::<Image>(None, IMAGE_CONFIG_NAME).await {
            Ok(Some(image)) => image,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Could not get Image with Name: {}: {}", IMAGE_CONFIG_NAME, e);
                return Vec::new();
            }
        };
        if image.trusted_ca_name() != Some(cm.name_any().as_str()) {
            return Vec::new();
        }
        debug!("Trusted CA ConfigMap {} changed", cm.name_any());
        self.requeue_all().await
    }

    /// Requests for an Image event; relevant only for the cluster singleton
    pub async fn map_image(&self, image: &Image) -> Vec<ObjectRef<UpdateService>> {
        if !image.is_cluster_singleton() {
            return Vec::new();
        }
        debug!("Cluster image config changed");
        self.requeue_all().await
    }

    async fn requeue_all(&self) -> Vec<ObjectRef<UpdateService>> {
        match self.store.list::<UpdateService>(Some(&self.watch_namespace)).await {
            Ok(instances) => instances.iter().map(ObjectRef::from_obj).collect(),
            Err(e) => {
                error!("Failed to list UpdateServices: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use cluster_store::{MemoryStore, StoreError, StoreOp};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn mapper_with_instances(names: &[&str]) -> (MemoryStore, DependencyMapper<MemoryStore>) {
        let store = MemoryStore::new();
        for name in names {
            store.insert(create_test_update_service(name, 1, "quay.io/a"));
        }
        let mut elsewhere = create_test_update_service("elsewhere", 1, "quay.io/a");
        elsewhere.metadata.namespace = Some("other".to_string());
        store.insert(elsewhere);
        (store.clone(), DependencyMapper::new(store, TEST_NAMESPACE))
    }

    fn requested(refs: &[ObjectRef<UpdateService>]) -> Vec<(String, Option<String>)> {
        let mut out: Vec<_> = refs.iter().map(|r| (r.name.clone(), r.namespace.clone())).collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_referenced_config_map_requeues_every_instance() {
        let (store, mapper) = mapper_with_instances(&["a", "b"]);
        store.insert(create_test_image_config(Some("foo")));

        let refs = mapper
            .map_config_map(&create_test_config_map("foo", "openshift-config", &[]))
            .await;

        assert_eq!(
            requested(&refs),
            vec![
                ("a".to_string(), Some(TEST_NAMESPACE.to_string())),
                ("b".to_string(), Some(TEST_NAMESPACE.to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreferenced_config_map_maps_to_nothing() {
        let (store, mapper) = mapper_with_instances(&["a"]);
        store.insert(create_test_image_config(Some("foo")));

        let bar = mapper
            .map_config_map(&create_test_config_map("bar", "openshift-config", &[]))
            .await;
        let foo_elsewhere = mapper
            .map_config_map(&create_test_config_map("foo", TEST_NAMESPACE, &[]))
            .await;

        assert!(bar.is_empty());
        assert!(foo_elsewhere.is_empty());
    }

    #[tokio::test]
    async fn test_config_map_without_image_config_maps_to_nothing() {
        let (store, mapper) = mapper_with_instances(&["a"]);
        store.fail_next::<Image>(StoreOp::Get, StoreError::InvalidObject("boom".to_string()));

        let failed = mapper
            .map_config_map(&create_test_config_map("foo", "openshift-config", &[]))
            .await;
        let missing = mapper
            .map_config_map(&create_test_config_map("foo", "openshift-config", &[]))
            .await;

        assert!(failed.is_empty());
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_only_cluster_image_config_is_relevant() {
        let (_, mapper) = mapper_with_instances(&["a"]);

        let cluster = mapper.map_image(&create_test_image_config(None)).await;
        assert_eq!(requested(&cluster), vec![("a".to_string(), Some(TEST_NAMESPACE.to_string()))]);

        let mut other = create_test_image_config(None);
        other.metadata = ObjectMeta {
            name: Some("not-cluster".to_string()),
            ..Default::default()
        };
        assert!(mapper.map_image(&other).await.is_empty());

        let mut namespaced = create_test_image_config(None);
        namespaced.metadata.namespace = Some(TEST_NAMESPACE.to_string());
        assert!(mapper.map_image(&namespaced).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_maps_to_nothing() {
        let (store, mapper) = mapper_with_instances(&["a"]);
        store.fail_next::<UpdateService>(StoreOp::List, StoreError::InvalidObject("boom".to_string()));

        assert!(mapper.map_image(&create_test_image_config(None)).await.is_empty());
    }
}
