//! Reconciliation entry point
//!
//! Fetches the object, classifies the trigger, runs the matching pipeline
//! and turns the outcome into a requeue directive. Every failure is logged
//! here before it is returned to the runtime.

use std::sync::Arc;
use std::time::Duration;

use keel_common::events::AuditSink;
use keel_common::{DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RETRY_INTERVAL_SECS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::binding::Binding;
use crate::error::{PhaseError, ReconcileError};
use crate::pipeline::{Pipeline, Requeue};
use crate::request::Request;
use crate::store::{ObjectKey, ObjectStore};
use crate::trigger::Trigger;

/// Timing knobs of the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Re-verification interval after a successful Create/Update pass
    pub steady_state_interval: Duration,
    /// Retry interval after a recoverable failure
    pub retry_interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            steady_state_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
        }
    }
}

/// Runs reconciliation passes for one binding
pub struct Dispatcher<B: Binding> {
    binding: Arc<B>,
    objects: Arc<dyn ObjectStore<B::Object>>,
    audit: Arc<dyn AuditSink>,
    config: ReconcileConfig,
    apply: Pipeline<B>,
    delete: Pipeline<B>,
}

impl<B: Binding> Dispatcher<B> {
    /// Dispatcher with the standard Create/Update and Delete pipelines
    pub fn new(
        binding: Arc<B>,
        objects: Arc<dyn ObjectStore<B::Object>>,
        audit: Arc<dyn AuditSink>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            apply: Pipeline::create_update(config.steady_state_interval),
            delete: Pipeline::delete(),
            binding,
            objects,
            audit,
            config,
        }
    }

    /// Engine timing
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Run one pass for the object identified by `key`.
    ///
    /// A missing object yields `Requeue::None`. Errors are logged and
    /// returned; recoverable ones carry the retry interval.
    #[instrument(skip_all, fields(object = %key))]
    pub async fn dispatch(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Requeue, ReconcileError> {
        let object = match self.objects.get(key).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                debug!("object no longer exists, nothing to reconcile");
                return Ok(Requeue::None);
            }
            Err(source) => {
                let err = ReconcileError::new(
                    key.to_string(),
                    "NewRequest",
                    PhaseError::FetchFailed { source },
                    self.config.retry_interval,
                );
                error!(error = %err, kind = ?err.kind(), "reconciliation failed");
                return Err(err);
            }
        };

        let mut request = Request::new(
            object,
            Arc::clone(&self.binding),
            Arc::clone(&self.objects),
            Arc::clone(&self.audit),
        );

        let pipeline = match request.trigger() {
            Trigger::Create | Trigger::Update => &self.apply,
            Trigger::Delete => &self.delete,
        };
        info!(trigger = %request.trigger(), pipeline = pipeline.name(), "reconciling");

        let result = pipeline
            .execute(&mut request, self.config.retry_interval, cancel)
            .await;
        if let Err(err) = &result {
            error!(
                error = %err,
                kind = ?err.kind(),
                retry_after_secs = err.retry_after().map(|d| d.as_secs()),
                "reconciliation failed"
            );
        }
        result
    }
}
