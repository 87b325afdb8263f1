//! Types shared by Keel custom resources
//!
//! Resource definitions live with their controllers; this module holds the
//! status and reference types they have in common.

mod types;

pub use types::{Condition, ConditionStatus, LocalObjectRef};
