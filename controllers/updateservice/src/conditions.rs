//! Status condition tracking.
//!
//! Each pass rebuilds the condition list from scratch. The previous list is
//! consulted only to keep timestamps stable, so that an unchanged outcome
//! produces an unchanged status and no status write.

use chrono::{DateTime, Utc};
use crds::{Condition, ConditionStatus, ConditionType};

/// Upsert a condition by type.
///
/// An existing entry keeps its position; its transition time moves only when
/// the status flips. The heartbeat is always refreshed.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = Some(now);
        }
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.last_heartbeat_time = Some(now);
        return;
    }
    conditions.push(Condition {
        type_,
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_heartbeat_time: Some(now),
        last_transition_time: Some(now),
    });
}

/// Conditions for one pass
#[derive(Debug, Clone, Default)]
pub struct ConditionTracker {
    previous: Vec<Condition>,
    current: Vec<Condition>,
}

impl ConditionTracker {
    /// Start an empty list, remembering what the last pass reported
    pub fn new(previous: Vec<Condition>) -> Self {
        Self {
            previous,
            current: Vec::new(),
        }
    }

    /// Record a condition for this pass
    pub fn set(&mut self, type_: ConditionType, status: ConditionStatus, reason: &str, message: &str) {
        let now = Utc::now();
        set_condition(&mut self.current, type_, status, reason, message, now);

        // Intermediate values within a pass do not count as transitions
        let Some(before) = self.previous.iter().find(|c| c.type_ == type_) else {
            return;
        };
        if let Some(entry) = self.current.iter_mut().find(|c| c.type_ == type_) {
            if before.status == status {
                entry.last_transition_time = before.last_transition_time.or(Some(now));
            }
        }
    }

    /// Record `ReconcileCompleted=False` with a reason
    pub fn fail(&mut self, reason: &str, message: &str) {
        self.set(ConditionType::ReconcileCompleted, ConditionStatus::False, reason, message);
    }

    /// Record `RegistryCACertFound=False` with a reason
    pub fn ca_not_found(&mut self, reason: &str, message: &str) {
        self.set(ConditionType::RegistryCACertFound, ConditionStatus::False, reason, message);
    }

    /// Current entry for a type
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.current.iter().find(|c| c.type_ == type_)
    }

    /// Whether this pass reports the same outcome as the last one, ignoring
    /// heartbeats
    pub fn unchanged(&self) -> bool {
        self.previous.len() == self.current.len()
            && self.previous.iter().zip(&self.current).all(|(a, b)| {
                a.type_ == b.type_
                    && a.status == b.status
                    && a.reason == b.reason
                    && a.message == b.message
                    && a.last_transition_time == b.last_transition_time
            })
    }

    /// The conditions recorded this pass
    pub fn into_conditions(self) -> Vec<Condition> {
        self.current
    }
}
