//! Declarative reconciliation engine
//!
//! Converges an external system toward the desired state declared by a
//! Kubernetes object. A [`Dispatcher`] classifies each change into a
//! [`Trigger`], runs the matching [`Pipeline`] of phases against a
//! [`Request`], and reports a [`Requeue`] directive back to the runtime.
//!
//! Resource-specific behavior lives behind [`Binding`]; stores are injected
//! through [`ObjectStore`] and [`ExternalStore`].

#![deny(missing_docs)]

pub mod binding;
pub mod conditions;
pub mod dispatcher;
pub mod error;
pub mod finalizer;
pub mod patch;
pub mod phases;
pub mod pipeline;
pub mod request;
pub mod store;
pub mod trigger;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use binding::{Binding, Reconcilable};
pub use dispatcher::{Dispatcher, ReconcileConfig};
pub use error::{ErrorKind, PhaseError, ReconcileError};
pub use pipeline::{Phase, Pipeline, Requeue};
pub use request::Request;
pub use store::{ExternalStore, KubeObjectStore, ObjectKey, ObjectStore};
pub use trigger::Trigger;
