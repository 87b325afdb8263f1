//! Common types for Keel: shared CRD types, errors, events and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod telemetry;

pub use error::Error;

/// API group for all Keel custom resources
pub const KEEL_GROUP: &str = "keel.dev";

/// Field manager used for server-side patches issued by the operator
pub const FIELD_MANAGER: &str = "keel-controller";

/// Default interval between steady-state re-verification passes
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default interval before retrying a failed reconciliation pass
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;
