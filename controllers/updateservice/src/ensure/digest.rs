//! Graph-data tag resolution.
//!
//! The kubelet records the image ID it actually pulled in the pod status, so
//! a pod running the graph-data tag tells us which digest the tag points at
//! right now. The pod sleeps and exits; a finished pod is deleted and the
//! next pass starts a fresh one, which pulls the tag again.

use super::{stamp_owner, ConvergenceEngine};
use crate::error::ControllerError;
use crate::resources::Descriptor;
use cluster_store::ObjectStore;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

fn first_container_image(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref()?.containers.first()?.image.as_deref()
}

impl<S: ObjectStore> ConvergenceEngine<S> {
    /// Image ID reported by the resolver pod, if it has pulled the image.
    ///
    /// Creates the pod when missing and deletes it once it has finished or
    /// runs a different image than requested. `None` means no digest is
    /// known yet.
    pub async fn resolve_image_digest(&self, resolver: &Descriptor<Pod>) -> Result<Option<String>, ControllerError> {
        let namespace = resolver.namespace();
        let name = resolver.name();
        let Some(found) = self.store.find::<Pod>(namespace, name).await? else {
            let mut pod = resolver.payload.clone();
            stamp_owner(&mut pod, &resolver.owner);
            info!("Creating Pod {}/{}", namespace.unwrap_or_default(), name);
            self.store.create(&pod).await?;
            return Ok(None);
        };

        let phase = found.status.as_ref().and_then(|s| s.phase.as_deref());
        let stale = first_container_image(&found) != first_container_image(&resolver.payload);
        if matches!(phase, Some("Succeeded" | "Failed")) || stale {
            info!("Deleting Pod {}/{} ({})", namespace.unwrap_or_default(), name, phase.unwrap_or("stale image"));
            self.store.delete::<Pod>(namespace, name).await?;
            return Ok(None);
        }

        let image_id = found
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|statuses| statuses.first())
            .map(|status| status.image_id.as_str())
            .filter(|id| !id.is_empty());
        if image_id.is_none() {
            debug!("Pod {} has not reported an image ID yet", name);
        }
        Ok(image_id.map(str::to_string))
    }
}
