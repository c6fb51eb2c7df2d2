//! Per-kind ownership rules

use super::MergeOptions;
use crate::error::ControllerError;
use crate::resources::MergePolicy;
use cluster_store::StoreObject;
use crds::Route;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceSpec};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;

/// A kind the ensure engine can converge
pub trait Converge: StoreObject {
    /// Copy the fields the operator owns from `desired` onto `found`.
    ///
    /// `found` is the live object; anything not copied is kept as is.
    fn merge_owned(
        found: &mut Self,
        desired: &Self,
        policy: MergePolicy,
        options: &MergeOptions,
    ) -> Result<(), ControllerError>;
}

fn unsupported<K: StoreObject>(policy: MergePolicy) -> ControllerError {
    ControllerError::InvalidSpec(format!("merge policy {policy:?} does not apply to {}", K::kind_name()))
}

impl Converge for ConfigMap {
    fn merge_owned(found: &mut Self, desired: &Self, policy: MergePolicy, _: &MergeOptions) -> Result<(), ControllerError> {
        match policy {
            MergePolicy::DataOnly => {
                found.data.clone_from(&desired.data);
                Ok(())
            }
            other => Err(unsupported::<Self>(other)),
        }
    }
}

impl Converge for Secret {
    fn merge_owned(found: &mut Self, desired: &Self, policy: MergePolicy, _: &MergeOptions) -> Result<(), ControllerError> {
        match policy {
            MergePolicy::DataOnly => {
                found.data.clone_from(&desired.data);
                Ok(())
            }
            other => Err(unsupported::<Self>(other)),
        }
    }
}

impl Converge for Service {
    fn merge_owned(found: &mut Self, desired: &Self, policy: MergePolicy, _: &MergeOptions) -> Result<(), ControllerError> {
        if policy != MergePolicy::Service {
            return Err(unsupported::<Self>(policy));
        }
        let Some(want) = desired.spec.as_ref() else {
            return Ok(());
        };
        // clusterIP and friends are assigned by the API server
        let spec = found.spec.get_or_insert_with(ServiceSpec::default);
        spec.ports.clone_from(&want.ports);
        spec.selector.clone_from(&want.selector);
        spec.type_.clone_from(&want.type_);
        Ok(())
    }
}

impl Converge for PodDisruptionBudget {
    fn merge_owned(found: &mut Self, desired: &Self, policy: MergePolicy, _: &MergeOptions) -> Result<(), ControllerError> {
        match policy {
            MergePolicy::FullSpec => {
                found.spec.clone_from(&desired.spec);
                Ok(())
            }
            other => Err(unsupported::<Self>(other)),
        }
    }
}

impl Converge for NetworkPolicy {
    fn merge_owned(found: &mut Self, desired: &Self, policy: MergePolicy, _: &MergeOptions) -> Result<(), ControllerError> {
        match policy {
            MergePolicy::FullSpec => {
                found.spec.clone_from(&desired.spec);
                Ok(())
            }
            other => Err(unsupported::<Self>(other)),
        }
    }
}

impl Converge for Route {
    fn merge_owned(found: &mut Self, desired: &Self, policy: MergePolicy, _: &MergeOptions) -> Result<(), ControllerError> {
        if policy != MergePolicy::RouteExceptTls {
            return Err(unsupported::<Self>(policy));
        }
        // TLS may be edited by the user after creation; the host is
        // assigned by the router unless requested explicitly
        let tls = found.spec.tls.take();
        let host = found.spec.host.take();
        found.spec = desired.spec.clone();
        found.spec.tls = tls;
        if found.spec.host.is_none() {
            found.spec.host = host;
        }
        Ok(())
    }
}

impl Converge for Deployment {
    fn merge_owned(
        found: &mut Self,
        desired: &Self,
        policy: MergePolicy,
        options: &MergeOptions,
    ) -> Result<(), ControllerError> {
        match policy {
            MergePolicy::Workload => super::workload::merge_deployment(found, desired, options),
            other => Err(unsupported::<Self>(other)),
        }
    }
}
