//! Kubernetes resource watchers.
//!
//! Runs the UpdateService reconcile loop on `kube_runtime::Controller`.
//! Managed objects are watched through their owner references. The two
//! unowned dependencies (the registry CA ConfigMap in `openshift-config` and
//! the cluster image config) are watched raw and passed through the
//! [`DependencyMapper`]; a relevant event requeues every instance.

use crate::backoff::InstanceBackoffs;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::mapper::DependencyMapper;
use crate::reconciler::{PassOutcome, Reconciler};
use crate::resources::names::{GRAPH_DATA_DIGEST_POD, OPENSHIFT_CONFIG_NAMESPACE};
use cluster_store::KubeStore;
use crds::{Image, Route, UpdateService};
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{self, Action, Config as RuntimeConfig};
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared state handed to every reconcile call
struct Context {
    reconciler: Reconciler<KubeStore>,
    resync_interval: Duration,
    backoffs: InstanceBackoffs,
}

fn instance_key(obj: &UpdateService) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

type RunError = controller::Error<ControllerError, watcher::Error>;

/// Instance key of an object the controller dropped because it was deleted.
///
/// The runtime reports deletions as `ObjectNotFound` without calling
/// `reconcile`, so this is the only place a deleted instance is seen.
fn deleted_instance_key(error: &RunError) -> Option<String> {
    match error {
        controller::Error::ObjectNotFound(obj_ref) => Some(format!(
            "{}/{}",
            obj_ref.namespace.as_deref().unwrap_or_default(),
            obj_ref.name
        )),
        _ => None,
    }
}

async fn reconcile(obj: Arc<UpdateService>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    debug!("Reconciling UpdateService {}/{}", namespace, name);

    let outcome = ctx.reconciler.reconcile(&namespace, &name).await?;
    ctx.backoffs.forget(&instance_key(&obj));
    Ok(match outcome {
        PassOutcome::Converged => Action::requeue(ctx.resync_interval),
        PassOutcome::Rejected | PassOutcome::Gone | PassOutcome::Ignored => Action::await_change(),
    })
}

fn error_policy(obj: Arc<UpdateService>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = instance_key(&obj);
    let delay = ctx.backoffs.next_backoff(&key);
    error!("Reconciliation error for UpdateService {}: {} (retrying in {:?})", key, error, delay);
    Action::requeue(delay)
}

/// Fires whenever a dependency event maps to at least one instance.
///
/// The raw watch runs on its own task; the controller only sees a channel.
fn dependency_trigger<K, F, Fut>(api: Api<K>, kind: &'static str, map: F) -> UnboundedReceiver<()>
where
    K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    F: Fn(K) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = bool> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(async move {
        let mut events = watcher(api, watcher::Config::default()).applied_objects().boxed();
        while let Some(event) = events.next().await {
            match event {
                Ok(obj) => {
                    if map(obj).await && tx.unbounded_send(()).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{} watch error: {}", kind, e),
            }
        }
        debug!("{} dependency watch ended", kind);
    });
    rx
}

/// Watches UpdateService instances and everything they depend on
pub struct Watcher {
    client: Client,
    store: KubeStore,
    config: ControllerConfig,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("store", &self.store)
            .field("watch_namespace", &self.config.watch_namespace)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(client: Client, store: KubeStore, config: ControllerConfig) -> Self {
        Self { client, store, config }
    }

    /// Run the controller until its watch streams end
    pub async fn watch_update_services(self) -> Result<(), ControllerError> {
        let ns = self.config.watch_namespace.as_str();
        info!("Starting UpdateService watcher in namespace {}", ns);

        let reconciler = Reconciler::new(self.store.clone(), &self.config)?;
        let ctx = Arc::new(Context {
            reconciler,
            resync_interval: self.config.resync_interval,
            backoffs: InstanceBackoffs::new(self.config.error_backoff_min, self.config.error_backoff_max),
        });

        let mapper = DependencyMapper::new(self.store.clone(), ns);
        let config_maps = {
            let mapper = mapper.clone();
            dependency_trigger(
                Api::<ConfigMap>::namespaced(self.client.clone(), OPENSHIFT_CONFIG_NAMESPACE),
                "ConfigMap",
                move |cm: ConfigMap| {
                    let mapper = mapper.clone();
                    async move { !mapper.map_config_map(&cm).await.is_empty() }
                },
            )
        };
        let images = dependency_trigger(
            Api::<Image>::all(self.client.clone()),
            "Image",
            move |image: Image| {
                let mapper = mapper.clone();
                async move { !mapper.map_image(&image).await.is_empty() }
            },
        );

        let client = &self.client;
        let runtime_config = RuntimeConfig::default().debounce(Duration::from_secs(5)).concurrency(3);
        Controller::new(Api::<UpdateService>::namespaced(client.clone(), ns), watcher::Config::default())
            .with_config(runtime_config)
            .owns(Api::<ConfigMap>::namespaced(client.clone(), ns), watcher::Config::default())
            .owns(Api::<Secret>::namespaced(client.clone(), ns), watcher::Config::default())
            .owns(Api::<Service>::namespaced(client.clone(), ns), watcher::Config::default())
            .owns(Api::<Deployment>::namespaced(client.clone(), ns), watcher::Config::default())
            .owns(Api::<PodDisruptionBudget>::namespaced(client.clone(), ns), watcher::Config::default())
            .owns(Api::<NetworkPolicy>::namespaced(client.clone(), ns), watcher::Config::default())
            .owns(Api::<Route>::namespaced(client.clone(), ns), watcher::Config::default())
            .owns(
                Api::<Pod>::namespaced(client.clone(), ns),
                watcher::Config::default().labels(&format!("app={GRAPH_DATA_DIGEST_POD}")),
            )
            .reconcile_all_on(config_maps)
            .reconcile_all_on(images)
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::clone(&ctx))
            .for_each(|res| {
                match res {
                    Ok((obj, _action)) => debug!("Reconciled {}", obj),
                    Err(e) => match deleted_instance_key(&e) {
                        Some(key) => {
                            ctx.backoffs.forget(&key);
                            debug!(
                                "UpdateService {} deleted, {} instances backing off",
                                key,
                                ctx.backoffs.tracked()
                            );
                        }
                        None => error!("Controller error for UpdateService: {}", e),
                    },
                }
                futures::future::ready(())
            })
            .await;

        info!("UpdateService watcher stopped");
        Ok(())
    }
}
