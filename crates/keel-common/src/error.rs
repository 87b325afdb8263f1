//! Error types shared by the object store, the external stores and bindings
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the context needed to trace a failure (the remote
//! operation, the resource, the HTTP status) without inspecting internal state.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Keel store operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Remote system (external API) error
    #[error("external error [{operation}]: {message}")]
    External {
        /// Remote operation that failed (e.g. "get cluster", "create identity provider")
        operation: String,
        /// Description of what failed
        message: String,
        /// HTTP status code returned by the remote system, if any
        status: Option<u16>,
    },

    /// A referenced entity does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing entity (e.g. "cluster", "Secret")
        kind: String,
        /// Name of the missing entity
        name: String,
    },

    /// The remote system answered but omitted an identifier we depend on
    #[error("missing {what} in response")]
    MissingIdentifier {
        /// Which identifier was missing (e.g. "cluster id")
        what: String,
    },

    /// Validation error for CRD specs or referenced data
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "object-store", "binding")
        context: String,
    },
}

impl Error {
    /// Create an external error for the given remote operation
    pub fn external(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::External {
            operation: operation.into(),
            message: msg.into(),
            status: None,
        }
    }

    /// Create an external error carrying the remote HTTP status
    pub fn external_status(
        operation: impl Into<String>,
        status: u16,
        msg: impl Into<String>,
    ) -> Self {
        Self::External {
            operation: operation.into(),
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a missing-identifier error
    pub fn missing_identifier(what: impl Into<String>) -> Self {
        Self::MissingIdentifier { what: what.into() }
    }

    /// Create a validation error for a resource
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether this error means the addressed entity does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            Error::External { status, .. } => *status == Some(404),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
