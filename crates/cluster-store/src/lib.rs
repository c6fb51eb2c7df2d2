//! Cluster Object Store
//!
//! A narrow, typed view of the Kubernetes API: get/list/create/update/delete
//! by kind, namespace and name, plus a status write for the primary kind.
//! The reconciliation engine is written against [`ObjectStore`] so it can be
//! exercised without a cluster.
//!
//! # Example
//!
//! ```no_run
//! use cluster_store::{KubeStore, ObjectStore};
//! use k8s_openapi::api::core::v1::Secret;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeStore::new(client, Duration::from_secs(30));
//!
//! // Optional read: NotFound becomes None
//! let pull_secret: Option<Secret> = store.find(Some("openshift-config"), "pull-secret").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Typed objects**: every kind the operator touches implements [`StoreObject`]
//! - **Bounded calls**: [`KubeStore`] puts a deadline on every API call
//! - **In-memory fake**: [`MemoryStore`] (feature `test-util`) with write
//!   accounting and one-shot error injection

pub mod client;
pub mod error;
#[cfg(feature = "test-util")]
pub mod mock;
pub mod object;
pub mod store;

pub use client::KubeStore;
pub use error::StoreError;
#[cfg(feature = "test-util")]
pub use mock::{MemoryStore, StoreOp};
pub use object::StoreObject;
pub use store::ObjectStore;
