//! UpdateService Controller
//!
//! Deploys and converges OpenShift update service instances. For every
//! `UpdateService` in the operator namespace it keeps a graph-builder and
//! policy-engine deployment running, together with the ConfigMaps, Secret,
//! Services, PodDisruptionBudget, NetworkPolicy and Route they need, and
//! reports progress through status conditions.

mod backoff;
mod conditions;
mod config;
mod controller;
mod ensure;
mod error;
mod fingerprint;
mod mapper;
mod reconciler;
mod resources;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls transport needs a process-wide crypto provider; a second
    // install attempt only reports the existing one
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting UpdateService Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace);
    info!("  Operand image: {}", config.operand_image);
    info!("  Proxy configured: {}", config.proxy.is_configured());
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Unknown containers: {:?}", config.unknown_containers);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
