//! Errors produced by reconciliation phases
//!
//! Phases return [`PhaseError`]. The pipeline wraps it into a
//! [`ReconcileError`] carrying the object identity and the failing phase, so
//! a log line is enough to trace the failing step.

use std::time::Duration;

use thiserror::Error;

/// How the invoking runtime should treat a failed pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The external system was unreachable or inconsistent
    RecoverableRemote,
    /// The local object store rejected or failed a read or patch
    RecoverableLocal,
    /// Data or logic inconsistency; retrying will not help without a fix
    Fatal,
    /// The pass was cancelled between phases
    Cancelled,
}

impl ErrorKind {
    /// Whether a pass failing with this kind should be retried on a fixed interval
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RecoverableRemote | Self::RecoverableLocal)
    }
}

/// Error returned by a single phase
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Reading from the external system failed
    #[error("unable to retrieve {what} - {source}")]
    LookupFailed {
        /// What was being looked up (e.g. "cluster", "remote entity")
        what: String,
        /// Underlying store error
        #[source]
        source: keel_common::Error,
    },

    /// The external system answered without an identifier we depend on
    #[error("missing {what} in response")]
    IdentifierMissing {
        /// The missing identifier
        what: String,
    },

    /// Create, update or delete against the external system failed
    #[error("unable to {operation} - {source}")]
    WriteFailed {
        /// Operation that failed (e.g. "create remote entity")
        operation: String,
        /// Underlying store error
        #[source]
        source: keel_common::Error,
    },

    /// Patching the object or its status in the object store failed
    #[error("unable to patch {what} - {source}")]
    PatchFailed {
        /// What was being patched (e.g. "status", "finalizers")
        what: String,
        /// Underlying store error
        #[source]
        source: keel_common::Error,
    },

    /// Reading the reconciled object from the object store failed
    #[error("unable to fetch object - {source}")]
    FetchFailed {
        /// Underlying store error
        #[source]
        source: keel_common::Error,
    },

    /// Resolving referenced data for the remote payload failed
    #[error("unable to build remote payload - {source}")]
    PayloadFailed {
        /// Underlying error
        #[source]
        source: keel_common::Error,
    },

    /// A trigger name could not be classified
    #[error("unable to determine controller trigger from '{0}'")]
    TriggerUnknown(String),

    /// The pass was cancelled before the phase ran
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl PhaseError {
    /// Create a lookup error
    pub fn lookup(what: impl Into<String>, source: keel_common::Error) -> Self {
        Self::LookupFailed {
            what: what.into(),
            source,
        }
    }

    /// Create a write error
    pub fn write(operation: impl Into<String>, source: keel_common::Error) -> Self {
        Self::WriteFailed {
            operation: operation.into(),
            source,
        }
    }

    /// Create a patch error
    pub fn patch(what: impl Into<String>, source: keel_common::Error) -> Self {
        Self::PatchFailed {
            what: what.into(),
            source,
        }
    }

    /// Create a missing identifier error
    pub fn identifier_missing(what: impl Into<String>) -> Self {
        Self::IdentifierMissing { what: what.into() }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LookupFailed { .. } | Self::IdentifierMissing { .. } | Self::WriteFailed { .. } => {
                ErrorKind::RecoverableRemote
            }
            Self::PatchFailed { .. } | Self::FetchFailed { .. } | Self::PayloadFailed { .. } => {
                ErrorKind::RecoverableLocal
            }
            Self::TriggerUnknown(_) => ErrorKind::Fatal,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// A failed reconciliation pass
#[derive(Debug, Error)]
#[error("request={object}, phase={phase} - {source}")]
pub struct ReconcileError {
    /// Object identity as `namespace/name`
    pub object: String,
    /// Phase that failed
    pub phase: &'static str,
    /// Fixed retry interval for recoverable kinds
    pub retry_after: Option<Duration>,
    /// The phase error
    #[source]
    pub source: PhaseError,
}

impl ReconcileError {
    /// Wrap a phase error; recoverable kinds get `retry_interval`
    pub fn new(
        object: impl Into<String>,
        phase: &'static str,
        source: PhaseError,
        retry_interval: Duration,
    ) -> Self {
        let retry_after = source.kind().is_recoverable().then_some(retry_interval);
        Self {
            object: object.into(),
            phase,
            retry_after,
            source,
        }
    }

    /// Classification of the underlying phase error
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// When the runtime should re-invoke, if the error carries an override
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}
