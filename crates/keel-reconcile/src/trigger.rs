//! Trigger classification
//!
//! An object carries no explicit verb. Its deletion marker and whether an
//! external identifier has been recorded decide which pipeline runs.

use std::fmt;
use std::str::FromStr;

use crate::binding::Reconcilable;
use crate::error::PhaseError;

/// What a reconciliation pass is converging toward
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The remote entity is not known yet
    Create,
    /// The remote entity is known and may have drifted
    Update,
    /// The object is being deleted
    Delete,
}

impl Trigger {
    /// Classify from the raw inputs, in priority order: deletion marker,
    /// then recorded external identifier.
    pub fn classify(deletion_requested: bool, external_id: Option<&str>) -> Self {
        if deletion_requested {
            Self::Delete
        } else if external_id.is_some_and(|id| !id.is_empty()) {
            Self::Update
        } else {
            Self::Create
        }
    }

    /// Classify a reconciled object
    pub fn of<K: Reconcilable>(object: &K) -> Self {
        Self::classify(
            object.meta().deletion_timestamp.is_some(),
            object.external_id(),
        )
    }

    /// Name used in condition reasons and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Create" => Ok(Self::Create),
            "Update" => Ok(Self::Update),
            "Delete" => Ok(Self::Delete),
            other => Err(PhaseError::TriggerUnknown(other.to_string())),
        }
    }
}
