//! UpdateService CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the UpdateService operator, plus
//! typed definitions of the OpenShift APIs it reads (`config.openshift.io/v1`
//! `Image`) and writes (`route.openshift.io/v1` `Route`).

pub mod conditions;
pub mod image_config;
pub mod references;
pub mod route;
pub mod update_service;

pub use conditions::*;
pub use image_config::*;
pub use references::*;
pub use route::*;
pub use update_service::*;
