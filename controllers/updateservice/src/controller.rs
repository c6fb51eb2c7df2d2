//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the object store and the UpdateService watcher together.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::watcher::Watcher;
use cluster_store::KubeStore;
use kube::Client;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for UpdateService management.
#[derive(Debug)]
pub struct Controller {
    update_service_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing UpdateService Controller");

        let kube_client = Client::try_default().await?;
        let store = KubeStore::new(kube_client.clone(), config.store_call_timeout);

        let watcher = Watcher::new(kube_client, store, config);
        let update_service_watcher = tokio::spawn(async move { watcher.watch_update_services().await });

        Ok(Self { update_service_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("UpdateService Controller running");

        self.update_service_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("UpdateService watcher panicked: {e}")))??;

        info!("UpdateService Controller stopped");
        Ok(())
    }
}
