//! Status conditions
//!
//! Reason-coded status entries in the OpenShift `conditionsv1` shape. Each
//! list holds at most one entry per [`ConditionType`]; see the controller's
//! condition tracker for the upsert rules.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition types reported on an UpdateService
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// Whether the last reconcile pass converged every managed object
    ReconcileCompleted,

    /// Whether the additional registry CA certificate was found
    RegistryCACertFound,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::ReconcileCompleted => f.write_str("ReconcileCompleted"),
            ConditionType::RegistryCACertFound => f.write_str("RegistryCACertFound"),
        }
    }
}

/// Tri-state condition status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,

    /// The condition does not hold
    False,

    /// Not yet determined
    #[default]
    Unknown,
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Condition status
    pub status: ConditionStatus,

    /// Machine-readable reason for the last change
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable detail
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Last time the condition was set, whether or not it changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<DateTime<Utc>>,

    /// Last time the status flipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Whether this condition reports the given type with status `True`
    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.type_ == type_ && self.status == ConditionStatus::True
    }
}
