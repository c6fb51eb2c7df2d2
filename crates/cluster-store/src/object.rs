//! Kinds the store can address
//!
//! Namespaced kinds are scoped to the requested namespace (or listed across
//! all namespaces when none is given); cluster-scoped kinds ignore the
//! namespace.

use crds::{Image, Route, UpdateService};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// A typed Kubernetes object the store can read and write
pub trait StoreObject:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Whether objects of this kind live in a namespace
    const NAMESPACED: bool;

    /// API handle for this kind
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Kind name, e.g. `ConfigMap`
    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }
}

macro_rules! namespaced_objects {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StoreObject for $ty {
                const NAMESPACED: bool = true;

                fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
                    match namespace {
                        Some(ns) => Api::namespaced(client, ns),
                        None => Api::all(client),
                    }
                }
            }
        )*
    };
}

macro_rules! cluster_objects {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StoreObject for $ty {
                const NAMESPACED: bool = false;

                fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
                    Api::all(client)
                }
            }
        )*
    };
}

namespaced_objects!(
    ConfigMap,
    Secret,
    Service,
    Deployment,
    Pod,
    PodDisruptionBudget,
    NetworkPolicy,
    Route,
    UpdateService,
);

cluster_objects!(Image);
