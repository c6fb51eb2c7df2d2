//! Ensure operators.
//!
//! `ensure` brings one managed object in line with its [`Descriptor`]:
//! create it when missing, otherwise copy only the fields the operator owns
//! onto the live object and write it back if anything changed. Fields owned
//! by the API server, the platform, or the user (a Service's `clusterIP`, a
//! Route's TLS block, extra containers) survive every pass.

mod digest;
mod merge;
mod workload;

#[cfg(test)]
mod ensure_test;

pub use merge::Converge;

use crate::config::UnknownContainerPolicy;
use crate::error::ControllerError;
use crate::resources::{Descriptor, MergePolicy};
use cluster_store::ObjectStore;
use crds::Route;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs for the per-kind merge rules
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Handling of main containers the operator does not manage
    pub unknown_containers: UnknownContainerPolicy,
}

/// Converges managed objects against the object store
#[derive(Debug, Clone)]
pub struct ConvergenceEngine<S> {
    store: S,
    retry_delay: Duration,
    options: MergeOptions,
}

impl<S: ObjectStore> ConvergenceEngine<S> {
    /// Create an engine.
    ///
    /// `retry_delay` is how long to wait before retrying an ensure whose
    /// create lost a race with another writer.
    pub fn new(store: S, retry_delay: Duration, options: MergeOptions) -> Self {
        Self {
            store,
            retry_delay,
            options,
        }
    }

    /// Get-or-create-or-update one object, returning its state in the store.
    ///
    /// A create that fails because the object appeared in the meantime is
    /// retried once after `retry_delay`; the retry then finds and converges
    /// the object.
    pub async fn ensure<K: Converge>(&self, desired: &Descriptor<K>) -> Result<K, ControllerError> {
        match self.ensure_once(desired).await {
            Err(e) if e.is_already_exists() => {
                warn!(
                    "{} {} was created concurrently, retrying in {:?}",
                    K::kind_name(),
                    desired.name(),
                    self.retry_delay
                );
                tokio::time::sleep(self.retry_delay).await;
                self.ensure_once(desired).await
            }
            result => result,
        }
    }

    /// Ensure the policy-engine route.
    ///
    /// Earlier releases named the route differently. When a route with the
    /// legacy name exists it is converged in place so its host keeps
    /// working; otherwise the route is ensured under its current name.
    pub async fn ensure_route(&self, desired: &Descriptor<Route>, legacy_name: &str) -> Result<Route, ControllerError> {
        if let Some(found) = self.store.find::<Route>(desired.namespace(), legacy_name).await? {
            debug!("Converging legacy Route {}", legacy_name);
            return self.converge(desired, found).await;
        }
        self.ensure(desired).await
    }

    async fn ensure_once<K: Converge>(&self, desired: &Descriptor<K>) -> Result<K, ControllerError> {
        match self.store.find::<K>(desired.namespace(), desired.name()).await? {
            None => self.create(desired).await,
            Some(found) => self.converge(desired, found).await,
        }
    }

    async fn create<K: Converge>(&self, desired: &Descriptor<K>) -> Result<K, ControllerError> {
        let mut obj = desired.payload.clone();
        stamp_owner(&mut obj, &desired.owner);
        info!(
            "Creating {} {}/{}",
            K::kind_name(),
            desired.namespace().unwrap_or_default(),
            desired.name()
        );
        Ok(self.store.create(&obj).await?)
    }

    async fn converge<K: Converge>(&self, desired: &Descriptor<K>, found: K) -> Result<K, ControllerError> {
        if desired.policy == MergePolicy::CreateOnly {
            debug!("{} {} exists, leaving it alone", K::kind_name(), found.name_any());
            return Ok(found);
        }

        let mut updated = found.clone();
        stamp_owner(&mut updated, &desired.owner);
        K::merge_owned(&mut updated, &desired.payload, desired.policy, &self.options)?;

        if updated == found {
            debug!("{} {} is up to date", K::kind_name(), found.name_any());
            return Ok(found);
        }
        info!(
            "Updating {} {}/{}",
            K::kind_name(),
            found.namespace().unwrap_or_default(),
            found.name_any()
        );
        Ok(self.store.update(&updated).await?)
    }
}

/// Add the controller reference unless the object already has a controller
fn stamp_owner<K: kube::Resource>(obj: &mut K, owner: &OwnerReference) {
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if !refs.iter().any(|r| r.controller == Some(true)) {
        refs.push(owner.clone());
    }
}
