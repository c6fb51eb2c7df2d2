//! Deployment merge.
//!
//! The operator owns the pod template's shape (replicas, selector, rollout
//! strategy, volumes) and the listed fields of its own containers. Other
//! controllers and admission webhooks may add labels, annotations, resource
//! keys or whole sidecar containers; those are kept.

use super::MergeOptions;
use crate::config::UnknownContainerPolicy;
use crate::error::ControllerError;
use crate::resources::ContainerRole;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

pub(super) fn merge_deployment(
    found: &mut Deployment,
    desired: &Deployment,
    options: &MergeOptions,
) -> Result<(), ControllerError> {
    let want = desired
        .spec
        .as_ref()
        .ok_or_else(|| ControllerError::InvalidSpec("desired Deployment has no spec".to_string()))?;
    let spec = found.spec.get_or_insert_with(DeploymentSpec::default);
    spec.replicas = want.replicas;
    spec.selector.clone_from(&want.selector);
    spec.strategy.clone_from(&want.strategy);

    if let Some(want_meta) = want.template.metadata.as_ref() {
        let meta = spec.template.metadata.get_or_insert_with(ObjectMeta::default);
        union_into(&mut meta.labels, want_meta.labels.as_ref());
        union_into(&mut meta.annotations, want_meta.annotations.as_ref());
    }

    let Some(want_pod) = want.template.spec.as_ref() else {
        return Ok(());
    };
    let pod = spec.template.spec.get_or_insert_with(PodSpec::default);
    pod.volumes.clone_from(&want_pod.volumes);
    merge_containers(&mut pod.containers, &want_pod.containers, options.unknown_containers);
    merge_init_containers(&mut pod.init_containers, want_pod.init_containers.as_deref().unwrap_or_default())
}

/// Desired containers keyed by role, resolved once per merge
fn by_role(containers: &[Container]) -> HashMap<ContainerRole, &Container> {
    containers
        .iter()
        .filter_map(|c| ContainerRole::from_name(&c.name).map(|role| (role, c)))
        .collect()
}

fn merge_containers(found: &mut Vec<Container>, desired: &[Container], unknown: UnknownContainerPolicy) {
    let wanted = by_role(desired);
    found.retain_mut(|container| {
        match ContainerRole::from_name(&container.name).and_then(|role| wanted.get(&role)) {
            Some(want) => {
                copy_container_fields(container, want);
                true
            }
            None => match unknown {
                UnknownContainerPolicy::Skip => {
                    warn!("Encountered unexpected container {} in pod, leaving it", container.name);
                    true
                }
                UnknownContainerPolicy::Prune => {
                    info!("Removing unexpected container {} from pod", container.name);
                    false
                }
            },
        }
    });

    // a managed container deleted from the live object is restored
    for want in desired {
        if !found.iter().any(|c| c.name == want.name) {
            info!("Restoring missing container {}", want.name);
            found.push(want.clone());
        }
    }
}

fn merge_init_containers(found: &mut Option<Vec<Container>>, desired: &[Container]) -> Result<(), ControllerError> {
    let wanted = by_role(desired);
    let containers = found.get_or_insert_with(Vec::new);
    containers.retain_mut(|container| {
        match ContainerRole::from_name(&container.name).and_then(|role| wanted.get(&role)) {
            Some(want) => {
                container.image.clone_from(&want.image);
                container.image_pull_policy.clone_from(&want.image_pull_policy);
                container.volume_mounts.clone_from(&want.volume_mounts);
                true
            }
            None => {
                info!("Unexpected init container {} in pod will be removed", container.name);
                false
            }
        }
    });

    // newly enabled, or deleted from the live object
    for want in desired {
        if !containers.iter().any(|c| c.name == want.name) {
            info!("Adding init container {}", want.name);
            containers.push(want.clone());
        }
    }

    let merged = by_role(containers);
    if let Some(lost) = wanted.keys().find(|role| !merged.contains_key(role)) {
        return Err(ControllerError::MissingInitContainer(lost.name().to_string()));
    }
    if containers.is_empty() {
        *found = None;
    }
    Ok(())
}

fn copy_container_fields(container: &mut Container, want: &Container) {
    container.image.clone_from(&want.image);
    container.image_pull_policy.clone_from(&want.image_pull_policy);
    container.command.clone_from(&want.command);
    container.args.clone_from(&want.args);
    container.ports.clone_from(&want.ports);
    container.env.clone_from(&want.env);
    if let Some(want_resources) = want.resources.as_ref() {
        merge_resources(
            container.resources.get_or_insert_with(ResourceRequirements::default),
            want_resources,
        );
    }
    container.volume_mounts.clone_from(&want.volume_mounts);
    container.liveness_probe.clone_from(&want.liveness_probe);
    container.readiness_probe.clone_from(&want.readiness_probe);
}

/// Set the desired quantities, keeping keys added by others
fn merge_resources(found: &mut ResourceRequirements, want: &ResourceRequirements) {
    merge_quantities(&mut found.limits, want.limits.as_ref());
    merge_quantities(&mut found.requests, want.requests.as_ref());
}

fn merge_quantities(found: &mut Option<BTreeMap<String, Quantity>>, want: Option<&BTreeMap<String, Quantity>>) {
    let Some(want) = want else {
        return;
    };
    let found = found.get_or_insert_with(BTreeMap::new);
    for (key, quantity) in want {
        if found.get(key) != Some(quantity) {
            found.insert(key.clone(), quantity.clone());
        }
    }
}

fn union_into(found: &mut Option<BTreeMap<String, String>>, want: Option<&BTreeMap<String, String>>) {
    let Some(want) = want else {
        return;
    };
    let found = found.get_or_insert_with(BTreeMap::new);
    for (key, value) in want {
        found.insert(key.clone(), value.clone());
    }
}
