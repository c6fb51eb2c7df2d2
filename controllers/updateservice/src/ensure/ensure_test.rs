//! Unit tests for the ensure engine against the in-memory store

use super::*;
use crate::resources::{ContainerRole, DesiredStateBundle};
use crate::test_utils::*;
use cluster_store::{MemoryStore, StoreError, StoreOp};
use crds::{RouteIngress, RouteIngressCondition, RouteStatus, TlsConfig};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, Pod, Service};
use std::collections::BTreeMap;

fn engine(store: &MemoryStore) -> ConvergenceEngine<MemoryStore> {
    engine_with(store, UnknownContainerPolicy::Skip)
}

fn engine_with(store: &MemoryStore, unknown_containers: UnknownContainerPolicy) -> ConvergenceEngine<MemoryStore> {
    ConvergenceEngine::new(
        store.clone(),
        Duration::from_millis(1),
        MergeOptions { unknown_containers },
    )
}

fn bundle(releases: &str) -> DesiredStateBundle {
    let instance = create_test_update_service("example", 2, releases);
    create_test_builder().build(&instance, &pull_secret_only()).unwrap()
}

fn stored_deployment(store: &MemoryStore) -> Deployment {
    store.object::<Deployment>(Some(TEST_NAMESPACE), "example").unwrap()
}

fn sidecar(name: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some("quay.io/example/sidecar:latest".to_string()),
        ..Default::default()
    }
}

/// Apply a foreign edit to the stored Deployment, then forget the call
async fn edit_deployment(store: &MemoryStore, edit: impl FnOnce(&mut k8s_openapi::api::core::v1::PodSpec)) {
    let mut live = stored_deployment(store);
    let pod = live.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
    edit(pod);
    store.update(&live).await.unwrap();
    store.clear_calls();
}

#[tokio::test]
async fn test_ensure_twice_writes_once() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let bundle = bundle("quay.io/openshift-release-dev/ocp-release");

    engine.ensure(&bundle.graph_builder_config).await.unwrap();
    engine.ensure(&bundle.graph_builder_config).await.unwrap();
    engine.ensure(&bundle.deployment).await.unwrap();
    engine.ensure(&bundle.deployment).await.unwrap();

    assert_eq!(store.writes_of::<ConfigMap>().len(), 1);
    assert_eq!(store.writes_of::<Deployment>().len(), 1);
    assert!(store.writes().iter().all(|w| w.op == StoreOp::Create));
}

#[tokio::test]
async fn test_created_objects_carry_owner_reference() {
    let store = MemoryStore::new();
    let bundle = bundle("quay.io/a");
    let created = engine(&store).ensure(&bundle.env_config).await.unwrap();

    let refs = created.metadata.owner_references.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].uid, "uid-example");
    assert_eq!(refs[0].controller, Some(true));
}

#[tokio::test]
async fn test_service_cluster_ip_survives_update() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let mut bundle = bundle("quay.io/a");

    let created = engine.ensure(&bundle.policy_engine_service).await.unwrap();
    let cluster_ip = created.spec.as_ref().unwrap().cluster_ip.clone();
    assert!(cluster_ip.is_some());

    // unchanged desired state: nothing to write
    engine.ensure(&bundle.policy_engine_service).await.unwrap();
    assert_eq!(store.writes_of::<Service>().len(), 1);

    bundle
        .policy_engine_service
        .payload
        .spec
        .as_mut()
        .unwrap()
        .selector
        .as_mut()
        .unwrap()
        .insert("tier".to_string(), "frontend".to_string());
    let updated = engine.ensure(&bundle.policy_engine_service).await.unwrap();

    assert_eq!(store.writes_of::<Service>().len(), 2);
    let spec = updated.spec.unwrap();
    assert_eq!(spec.cluster_ip, cluster_ip);
    assert_eq!(spec.selector.unwrap()["tier"], "frontend");
}

#[tokio::test]
async fn test_route_tls_and_host_are_preserved() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let mut bundle = bundle("quay.io/a");
    engine.ensure(&bundle.route).await.unwrap();

    // the user switches to reencrypt and the router assigns a host
    let mut live = store.object::<Route>(Some(TEST_NAMESPACE), "example-route").unwrap();
    live.spec.tls = Some(TlsConfig {
        termination: "reencrypt".to_string(),
        insecure_edge_termination_policy: Some("Redirect".to_string()),
        ..Default::default()
    });
    live.spec.host = Some("updates.apps.example.com".to_string());
    store.update(&live).await.unwrap();
    store.clear_calls();

    engine.ensure(&bundle.route).await.unwrap();
    assert!(store.writes().is_empty());

    bundle.route.payload.spec.to.weight = Some(50);
    let converged = engine.ensure(&bundle.route).await.unwrap();

    assert_eq!(store.writes_of::<Route>().len(), 1);
    assert_eq!(converged.spec.to.weight, Some(50));
    assert_eq!(converged.spec.tls.unwrap().termination, "reencrypt");
    assert_eq!(converged.spec.host.as_deref(), Some("updates.apps.example.com"));
}

#[tokio::test]
async fn test_route_tls_keeps_unmodelled_settings() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let mut bundle = bundle("quay.io/a");
    engine.ensure(&bundle.route).await.unwrap();

    let mut live = store.object::<Route>(Some(TEST_NAMESPACE), "example-route").unwrap();
    let tls = live.spec.tls.as_mut().unwrap();
    tls.extra.insert(
        "externalCertificate".to_string(),
        serde_json::json!({"name": "updates-cert"}),
    );
    store.update(&live).await.unwrap();
    store.clear_calls();

    bundle.route.payload.spec.to.weight = Some(50);
    let converged = engine.ensure(&bundle.route).await.unwrap();

    assert_eq!(store.writes_of::<Route>().len(), 1);
    let stored = store.object::<Route>(Some(TEST_NAMESPACE), "example-route").unwrap();
    for route in [converged, stored] {
        let tls = serde_json::to_value(route.spec.tls.unwrap()).unwrap();
        assert_eq!(
            tls,
            serde_json::json!({
                "termination": "edge",
                "insecureEdgeTerminationPolicy": "None",
                "externalCertificate": {"name": "updates-cert"}
            })
        );
    }
}

#[tokio::test]
async fn test_legacy_route_is_converged_in_place() {
    let store = MemoryStore::new();
    let bundle = bundle("quay.io/a");

    let mut legacy = bundle.route.payload.clone();
    legacy.metadata.name = Some(bundle.legacy_route_name.clone());
    legacy.spec.to.name = "stale-service".to_string();
    legacy.status = Some(RouteStatus {
        ingress: vec![RouteIngress {
            host: "legacy.apps.example.com".to_string(),
            router_name: Some("default".to_string()),
            conditions: vec![RouteIngressCondition {
                type_: "Admitted".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }],
        }],
    });
    store.insert(legacy);

    let converged = engine(&store)
        .ensure_route(&bundle.route, &bundle.legacy_route_name)
        .await
        .unwrap();

    assert_eq!(converged.metadata.name.as_deref(), Some("example-policy-engine-route"));
    assert_eq!(converged.spec.to.name, "example-policy-engine");
    assert_eq!(converged.ingress_uri().as_deref(), Some("https://legacy.apps.example.com"));
    assert!(store.object::<Route>(Some(TEST_NAMESPACE), "example-route").is_none());
    let writes = store.writes_of::<Route>();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].op, StoreOp::Update);
}

#[tokio::test]
async fn test_config_change_rolls_out_deployment() {
    let store = MemoryStore::new();
    let engine = engine(&store);

    let first = bundle("quay.io/openshift-release-dev/ocp-release");
    engine.ensure(&first.graph_builder_config).await.unwrap();
    engine.ensure(&first.deployment).await.unwrap();
    store.clear_calls();

    let second = bundle("registry.example.com/ocp/release");
    engine.ensure(&second.graph_builder_config).await.unwrap();
    let rolled = engine.ensure(&second.deployment).await.unwrap();

    let writes = store.writes_of::<Deployment>();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].op, StoreOp::Update);
    let annotations = rolled.spec.unwrap().template.metadata.unwrap().annotations.unwrap();
    assert_eq!(
        annotations[crate::resources::names::GRAPH_BUILDER_CONFIG_HASH_ANNOTATION],
        second.graph_builder_config_hash
    );
}

#[tokio::test]
async fn test_create_race_retries_once() {
    let store = MemoryStore::new();
    let bundle = bundle("quay.io/a");
    store.fail_next::<ConfigMap>(
        StoreOp::Create,
        StoreError::AlreadyExists("ConfigMap example-env".to_string()),
    );

    let created = engine(&store).ensure(&bundle.env_config).await.unwrap();

    assert_eq!(created.metadata.name.as_deref(), Some("example-env"));
    assert_eq!(store.writes_of::<ConfigMap>().len(), 1);
    assert_eq!(store.list::<ConfigMap>(Some(TEST_NAMESPACE)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_create_failure_propagates() {
    let store = MemoryStore::new();
    let bundle = bundle("quay.io/a");
    for _ in 0..2 {
        store.fail_next::<ConfigMap>(
            StoreOp::Create,
            StoreError::AlreadyExists("ConfigMap example-env".to_string()),
        );
    }

    let err = engine(&store).ensure(&bundle.env_config).await.unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_foreign_template_metadata_is_kept() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let bundle = bundle("quay.io/a");
    engine.ensure(&bundle.deployment).await.unwrap();

    let mut live = stored_deployment(&store);
    live.spec
        .as_mut()
        .unwrap()
        .template
        .metadata
        .as_mut()
        .unwrap()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert("kubectl.kubernetes.io/restartedAt".to_string(), "now".to_string());
    store.update(&live).await.unwrap();
    store.clear_calls();

    let converged = engine.ensure(&bundle.deployment).await.unwrap();
    assert!(store.writes().is_empty());
    let annotations = converged.spec.unwrap().template.metadata.unwrap().annotations.unwrap();
    assert!(annotations.contains_key("kubectl.kubernetes.io/restartedAt"));
}

#[tokio::test]
async fn test_unknown_init_containers_are_pruned() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let bundle = bundle("quay.io/a");
    engine.ensure(&bundle.deployment).await.unwrap();
    edit_deployment(&store, |pod| {
        pod.init_containers.as_mut().unwrap().push(sidecar("injected-init"));
    })
    .await;

    let converged = engine.ensure(&bundle.deployment).await.unwrap();

    let init = converged.spec.unwrap().template.spec.unwrap().init_containers.unwrap();
    let names: Vec<_> = init.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec![ContainerRole::GraphData.name()]);
    assert_eq!(store.writes_of::<Deployment>().len(), 1);
}

#[tokio::test]
async fn test_deleted_init_container_is_restored() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let bundle = bundle("quay.io/a");
    engine.ensure(&bundle.deployment).await.unwrap();
    edit_deployment(&store, |pod| pod.init_containers = None).await;

    let converged = engine.ensure(&bundle.deployment).await.unwrap();

    let init = converged.spec.unwrap().template.spec.unwrap().init_containers.unwrap();
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].name, ContainerRole::GraphData.name());
    assert_eq!(store.writes_of::<Deployment>().len(), 1);
}

#[tokio::test]
async fn test_enabling_graph_data_adds_init_container() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let mut instance = create_test_update_service("example", 2, "quay.io/a");
    instance.spec.graph_data_image = None;
    let without = create_test_builder().build(&instance, &pull_secret_only()).unwrap();
    engine.ensure(&without.deployment).await.unwrap();
    assert!(stored_deployment(&store).spec.unwrap().template.spec.unwrap().init_containers.is_none());
    store.clear_calls();

    instance.spec.graph_data_image = Some("quay.io/openshift/graph-data:v2".to_string());
    let with = create_test_builder().build(&instance, &pull_secret_only()).unwrap();
    let converged = engine.ensure(&with.deployment).await.unwrap();
    engine.ensure(&with.deployment).await.unwrap();

    let init = converged.spec.unwrap().template.spec.unwrap().init_containers.unwrap();
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].image.as_deref(), Some("quay.io/openshift/graph-data:v2"));
    assert_eq!(store.writes_of::<Deployment>().len(), 1);
}

#[tokio::test]
async fn test_unknown_main_container_is_skipped_by_default() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let bundle = bundle("quay.io/a");
    engine.ensure(&bundle.deployment).await.unwrap();
    edit_deployment(&store, |pod| pod.containers.push(sidecar("istio-proxy"))).await;

    let converged = engine.ensure(&bundle.deployment).await.unwrap();

    assert!(store.writes().is_empty());
    let containers = converged.spec.unwrap().template.spec.unwrap().containers;
    assert!(containers.iter().any(|c| c.name == "istio-proxy"));
}

#[tokio::test]
async fn test_unknown_main_container_is_pruned_when_configured() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, UnknownContainerPolicy::Prune);
    let bundle = bundle("quay.io/a");
    engine.ensure(&bundle.deployment).await.unwrap();
    edit_deployment(&store, |pod| pod.containers.push(sidecar("istio-proxy"))).await;

    let converged = engine.ensure(&bundle.deployment).await.unwrap();

    assert_eq!(store.writes_of::<Deployment>().len(), 1);
    let names: Vec<_> = converged
        .spec
        .unwrap()
        .template
        .spec
        .unwrap()
        .containers
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["graph-builder", "policy-engine"]);
}

#[tokio::test]
async fn test_drifted_container_fields_are_restored() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let bundle = bundle("quay.io/a");
    engine.ensure(&bundle.deployment).await.unwrap();
    edit_deployment(&store, |pod| {
        let policy_engine = pod.containers.iter_mut().find(|c| c.name == "policy-engine").unwrap();
        policy_engine.image = Some("quay.io/someone/else:latest".to_string());
        pod.containers.retain(|c| c.name != "graph-builder");
    })
    .await;

    let converged = engine.ensure(&bundle.deployment).await.unwrap();

    let containers = converged.spec.unwrap().template.spec.unwrap().containers;
    let policy_engine = containers.iter().find(|c| c.name == "policy-engine").unwrap();
    assert_eq!(policy_engine.image.as_deref(), Some(TEST_OPERAND_IMAGE));
    assert!(containers.iter().any(|c| c.name == "graph-builder"));
}

#[tokio::test]
async fn test_create_only_object_is_never_updated() {
    let proxy = crate::config::ProxyConfig {
        http_proxy: Some("http://proxy.example.com:3128".to_string()),
        ..Default::default()
    };
    let builder = crate::resources::DesiredStateBuilder::new(TEST_OPERAND_IMAGE, proxy);
    let instance = create_test_update_service("example", 1, "quay.io/a");
    let bundle = builder.build(&instance, &pull_secret_only()).unwrap();
    let request = bundle.cluster_ca.unwrap();

    // the network operator has injected the bundle since
    let store = MemoryStore::new();
    let mut injected = request.payload.clone();
    injected.data = Some(BTreeMap::from([(
        "ca-bundle.crt".to_string(),
        "-----BEGIN CERTIFICATE-----".to_string(),
    )]));
    store.insert(injected);

    let found = engine(&store).ensure(&request).await.unwrap();

    assert!(store.writes().is_empty());
    assert!(found.data.unwrap().contains_key("ca-bundle.crt"));
}

#[tokio::test]
async fn test_wrong_policy_is_rejected() {
    let store = MemoryStore::new();
    let mut bundle = bundle("quay.io/a");
    engine(&store).ensure(&bundle.env_config).await.unwrap();

    bundle.env_config.policy = MergePolicy::Workload;
    let err = engine(&store).ensure(&bundle.env_config).await.unwrap_err();
    assert!(matches!(err, ControllerError::InvalidSpec(_)));
}

/// Record what the kubelet reports for the resolver pod
async fn report_pod(store: &MemoryStore, status: serde_json::Value) {
    store
        .update_status::<Pod>(Some(TEST_NAMESPACE), "graph-data-tag-digest", &status)
        .await
        .unwrap();
    store.clear_calls();
}

#[tokio::test]
async fn test_digest_resolver_pod_is_created_first() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let bundle = bundle("quay.io/a");
    let resolver = bundle.graph_data_digest_pod.unwrap();

    assert_eq!(engine.resolve_image_digest(&resolver).await.unwrap(), None);

    let pod = store.object::<Pod>(Some(TEST_NAMESPACE), "graph-data-tag-digest").unwrap();
    assert_eq!(pod.metadata.owner_references.unwrap()[0].controller, Some(true));
    assert_eq!(store.writes_of::<Pod>().len(), 1);

    // created but not yet pulled
    store.clear_calls();
    assert_eq!(engine.resolve_image_digest(&resolver).await.unwrap(), None);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_digest_comes_from_pulled_image_id() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let resolver = bundle("quay.io/a").graph_data_digest_pod.unwrap();
    engine.resolve_image_digest(&resolver).await.unwrap();
    report_pod(
        &store,
        serde_json::json!({
            "phase": "Running",
            "containerStatuses": [{
                "name": "graph-data",
                "image": "quay.io/openshift/graph-data:latest",
                "imageID": "quay.io/openshift/graph-data@sha256:0123abcd",
                "ready": true,
                "restartCount": 0
            }]
        }),
    )
    .await;

    let digest = engine.resolve_image_digest(&resolver).await.unwrap();

    assert_eq!(digest.as_deref(), Some("quay.io/openshift/graph-data@sha256:0123abcd"));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_finished_resolver_pod_is_deleted() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let resolver = bundle("quay.io/a").graph_data_digest_pod.unwrap();
    engine.resolve_image_digest(&resolver).await.unwrap();
    report_pod(&store, serde_json::json!({"phase": "Succeeded"})).await;

    assert_eq!(engine.resolve_image_digest(&resolver).await.unwrap(), None);
    assert!(store.object::<Pod>(Some(TEST_NAMESPACE), "graph-data-tag-digest").is_none());

    // the next pass pulls the tag again
    engine.resolve_image_digest(&resolver).await.unwrap();
    assert!(store.object::<Pod>(Some(TEST_NAMESPACE), "graph-data-tag-digest").is_some());
}

#[tokio::test]
async fn test_resolver_pod_for_old_image_is_replaced() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let old = bundle("quay.io/a").graph_data_digest_pod.unwrap();
    engine.resolve_image_digest(&old).await.unwrap();
    store.clear_calls();

    let mut instance = create_test_update_service("example", 2, "quay.io/a");
    instance.spec.graph_data_image = Some("quay.io/example/graph-data:v2".to_string());
    let new = create_test_builder()
        .build(&instance, &pull_secret_only())
        .unwrap()
        .graph_data_digest_pod
        .unwrap();

    assert_eq!(engine.resolve_image_digest(&new).await.unwrap(), None);
    let deletes: Vec<_> = store.writes_of::<Pod>().into_iter().filter(|w| w.op == StoreOp::Delete).collect();
    assert_eq!(deletes.len(), 1);
}
