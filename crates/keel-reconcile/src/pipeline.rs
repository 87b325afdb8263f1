//! Ordered phase execution

use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::binding::Binding;
use crate::error::{PhaseError, ReconcileError};
use crate::phases::{Apply, Begin, Complete, CompleteDestroy, Destroy, GetCurrentState};
use crate::request::Request;

/// What the invoking runtime should do after a phase or pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Proceed to the next phase; at the end of a pass, wait for the next change
    None,
    /// Stop and re-invoke after the duration
    After(Duration),
}

impl Requeue {
    /// Convert to a controller action
    pub fn into_action(self) -> Action {
        match self {
            Self::None => Action::await_change(),
            Self::After(duration) => Action::requeue(duration),
        }
    }
}

impl From<Requeue> for Action {
    fn from(requeue: Requeue) -> Self {
        requeue.into_action()
    }
}

/// A named step of a pipeline
#[async_trait]
pub trait Phase<B: Binding>: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Run against the request. Must be safe to re-run after a crash or
    /// failure at any point.
    async fn run(&self, request: &mut Request<B>) -> Result<Requeue, PhaseError>;
}

/// Statically ordered phases for one trigger
pub struct Pipeline<B: Binding> {
    name: &'static str,
    phases: Vec<Box<dyn Phase<B>>>,
}

impl<B: Binding> Pipeline<B> {
    /// Empty pipeline
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            phases: Vec::new(),
        }
    }

    /// Append a phase
    pub fn phase(mut self, phase: impl Phase<B> + 'static) -> Self {
        self.phases.push(Box::new(phase));
        self
    }

    /// `Begin → GetCurrentState → Apply → Complete`
    pub fn create_update(steady_state_interval: Duration) -> Self {
        Self::new("CreateOrUpdate")
            .phase(Begin)
            .phase(GetCurrentState)
            .phase(Apply)
            .phase(Complete::new(steady_state_interval))
    }

    /// `Begin → Destroy → CompleteDestroy`
    pub fn delete() -> Self {
        Self::new("Delete")
            .phase(Begin)
            .phase(Destroy)
            .phase(CompleteDestroy)
    }

    /// Pipeline name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Phase names in execution order
    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    /// Run phases in order until one errors or asks for a requeue.
    ///
    /// Cancellation is checked before each phase; a phase already running is
    /// allowed to finish its writes.
    pub async fn execute(
        &self,
        request: &mut Request<B>,
        retry_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Requeue, ReconcileError> {
        let object = request.key().to_string();
        for phase in &self.phases {
            if cancel.is_cancelled() {
                info!(object = %object, phase = phase.name(), "reconciliation cancelled");
                return Err(ReconcileError::new(
                    object,
                    phase.name(),
                    PhaseError::Cancelled,
                    retry_interval,
                ));
            }

            debug!(object = %object, phase = phase.name(), "running phase");
            match phase.run(request).await {
                Ok(Requeue::None) => continue,
                Ok(requeue) => return Ok(requeue),
                Err(source) => {
                    return Err(ReconcileError::new(
                        object,
                        phase.name(),
                        source,
                        retry_interval,
                    ))
                }
            }
        }
        Ok(Requeue::None)
    }
}
