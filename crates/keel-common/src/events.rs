//! Audit events for Keel controllers.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that reconciliation phases can emit standard Kubernetes Events visible
//! via `kubectl describe` and `kubectl get events`.
//!
//! Recording is **fire-and-forget**: `record()` is synchronous, the kube
//! implementation publishes on a spawned task and logs failures as warnings.
//! A failed event must never block or break reconciliation.

use std::sync::Mutex;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Action taken against the external system
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    /// Remote entity was created
    Created,
    /// Remote entity was updated to match the desired state
    Updated,
    /// Remote entity was deleted
    Deleted,
}

impl AuditAction {
    /// Machine-readable reason string (the REASON column of `kubectl get events`)
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Created => reasons::CREATED,
            Self::Updated => reasons::UPDATED,
            Self::Deleted => reasons::DELETED,
        }
    }

    /// Action string (the ACTION column of `kubectl get events`)
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created => actions::CREATE,
            Self::Updated => actions::UPDATE,
            Self::Deleted => actions::DELETE,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Trait for recording audit events about reconciled objects.
///
/// Implementations must be fire-and-forget: they never block on I/O and
/// never return an error.
pub trait AuditSink: Send + Sync {
    /// Record that `action` was performed on behalf of `object`.
    ///
    /// # Arguments
    ///
    /// * `object` - The Kubernetes object the action was taken for
    /// * `action` - What happened in the external system
    /// * `detail` - Human-readable detail (e.g. remote name and cluster id)
    fn record(&self, object: &ObjectReference, action: AuditAction, detail: String);
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeAuditSink {
    recorder: Recorder,
}

impl KubeAuditSink {
    /// Create a new sink for the given controller name.
    ///
    /// The controller name appears as the "reportingComponent" on Events
    /// (e.g. "keel-ldap-controller").
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl AuditSink for KubeAuditSink {
    fn record(&self, object: &ObjectReference, action: AuditAction, detail: String) {
        let recorder = self.recorder.clone();
        let object = object.clone();
        let event = Event {
            type_: EventType::Normal,
            reason: action.reason().to_string(),
            note: Some(detail),
            action: action.action().to_string(),
            secondary: None,
        };
        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&event, &object).await {
                warn!(
                    reason = %event.reason,
                    action = %event.action,
                    error = %e,
                    "Failed to publish Kubernetes event"
                );
            }
        });
    }
}

/// No-op implementation.
///
/// All calls are silently ignored: no Kubernetes API interaction.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _object: &ObjectReference, _action: AuditAction, _detail: String) {}
}

/// Sink that keeps every recorded event in memory, for tests and dry runs.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<(ObjectReference, AuditAction, String)>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions recorded so far, in order
    pub fn actions(&self) -> Vec<AuditAction> {
        self.events
            .lock()
            .map(|events| events.iter().map(|(_, action, _)| *action).collect())
            .unwrap_or_default()
    }

    /// Details recorded so far, in order
    pub fn details(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.iter().map(|(_, _, detail)| detail.clone()).collect())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, object: &ObjectReference, action: AuditAction, detail: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push((object.clone(), action, detail));
        }
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// Remote entity created
    pub const CREATED: &str = "Created";
    /// Remote entity updated
    pub const UPDATED: &str = "Updated";
    /// Remote entity deleted
    pub const DELETED: &str = "Deleted";
}

/// Well-known event action strings.
pub mod actions {
    /// Creating a remote entity
    pub const CREATE: &str = "Create";
    /// Updating a remote entity
    pub const UPDATE: &str = "Update";
    /// Deleting a remote entity
    pub const DELETE: &str = "Delete";
}
