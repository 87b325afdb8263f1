//! Status condition tracking
//!
//! Pure functions over a condition list. Persisting the result is the
//! caller's job (see `Request::update_conditions`).

use chrono::{DateTime, Utc};
use keel_common::crd::{Condition, ConditionStatus};

use crate::trigger::Trigger;

/// Set at the start of every pass
pub const RECONCILING: &str = "Reconciling";
/// Set when a pass completes successfully
pub const RECONCILED: &str = "Reconciled";
/// Default condition marking the remote entity as deleted
pub const DELETED: &str = "Deleted";

/// Replace or insert `condition` by type.
///
/// An unchanged status keeps the existing `lastTransitionTime` and only
/// takes the new reason and message. A new type or a status change stamps
/// `now`. Returns whether the list changed.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition: Condition,
    now: DateTime<Utc>,
) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.status == condition.status => {
            let changed =
                existing.reason != condition.reason || existing.message != condition.message;
            existing.reason = condition.reason;
            existing.message = condition.message;
            changed
        }
        Some(existing) => {
            *existing = Condition {
                last_transition_time: now,
                ..condition
            };
            true
        }
        None => {
            conditions.push(Condition {
                last_transition_time: now,
                ..condition
            });
            true
        }
    }
}

/// Look up a condition by type
pub fn find<'a>(type_: &str, conditions: &'a [Condition]) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether a condition of this type exists with status `True`
pub fn is_set(type_: &str, conditions: &[Condition]) -> bool {
    find(type_, conditions).is_some_and(Condition::is_true)
}

/// `Reconciling=True`, reason is the trigger
pub fn reconciling(trigger: Trigger) -> Condition {
    Condition::new(
        RECONCILING,
        ConditionStatus::True,
        trigger.as_str(),
        "reconciling object",
    )
}

/// `Reconciled=True`, reason is the trigger
pub fn reconciled(trigger: Trigger) -> Condition {
    Condition::new(
        RECONCILED,
        ConditionStatus::True,
        trigger.as_str(),
        "reconciled object",
    )
}

/// Deletion condition of the given type set to `True`
pub fn deleted(type_: &str, message: impl Into<String>) -> Condition {
    Condition::new(
        type_,
        ConditionStatus::True,
        Trigger::Delete.as_str(),
        message,
    )
}
