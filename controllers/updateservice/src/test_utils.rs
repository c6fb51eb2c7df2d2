//! Test utilities for unit testing the builder, ensure engine and reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::config::{ControllerConfig, ProxyConfig};
use crate::resources::names::{OPENSHIFT_CONFIG_NAMESPACE, PULL_SECRET_NAME};
use crate::resources::{DesiredStateBuilder, ExternalDependencies};
use cluster_store::MemoryStore;
use crds::{ConfigMapNameReference, Image, ImageSpec, UpdateService, UpdateServiceSpec, IMAGE_CONFIG_NAME};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::time::Duration;

/// Namespace the test operator watches
pub const TEST_NAMESPACE: &str = "openshift-update-service";
/// Operand image used in tests
pub const TEST_OPERAND_IMAGE: &str = "quay.io/cincinnati/cincinnati:latest";

/// Helper to create a test UpdateService
pub fn create_test_update_service(name: &str, replicas: i32, releases: &str) -> UpdateService {
    UpdateService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            uid: Some(format!("uid-{name}")),
            ..Default::default()
        },
        spec: UpdateServiceSpec {
            replicas,
            releases: releases.to_string(),
            graph_data_image: Some("quay.io/openshift/graph-data:latest".to_string()),
            external_ca_config_map_key: None,
        },
        status: None,
    }
}

/// Helper to create the cluster pull secret
pub fn create_test_pull_secret() -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(PULL_SECRET_NAME.to_string()),
            namespace: Some(OPENSHIFT_CONFIG_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            ".dockerconfigjson".to_string(),
            ByteString(br#"{"auths":{}}"#.to_vec()),
        )])),
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        ..Default::default()
    }
}

/// Helper to create a ConfigMap with the given data
pub fn create_test_config_map(name: &str, namespace: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Helper to create the cluster image config, optionally naming a trusted CA ConfigMap
pub fn create_test_image_config(trusted_ca: Option<&str>) -> Image {
    Image {
        metadata: ObjectMeta {
            name: Some(IMAGE_CONFIG_NAME.to_string()),
            ..Default::default()
        },
        spec: ImageSpec {
            additional_trusted_ca: trusted_ca.map(ConfigMapNameReference::new).unwrap_or_default(),
        },
    }
}

/// Controller configuration with short delays for tests
pub fn create_test_config(proxy: ProxyConfig) -> ControllerConfig {
    let mut config = ControllerConfig::new(TEST_NAMESPACE, TEST_OPERAND_IMAGE);
    config.proxy = proxy;
    config.create_retry_delay = Duration::from_millis(1);
    config
}

/// Builder with the test operand image and no proxy
pub fn create_test_builder() -> DesiredStateBuilder {
    DesiredStateBuilder::new(TEST_OPERAND_IMAGE, ProxyConfig::default())
}

/// Dependencies with only the pull secret present
pub fn pull_secret_only() -> ExternalDependencies {
    ExternalDependencies {
        pull_secret: Some(create_test_pull_secret()),
        ..Default::default()
    }
}

/// Store seeded with an UpdateService and the cluster pull secret
pub fn seeded_store(instance: &UpdateService) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert(instance.clone());
    store.insert(create_test_pull_secret());
    store
}
