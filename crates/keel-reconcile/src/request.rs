//! Per-pass reconciliation context

use std::sync::Arc;

use chrono::Utc;
use keel_common::crd::Condition;
use keel_common::events::{AuditAction, AuditSink};
use kube::Resource;
use tracing::debug;

use crate::binding::{Binding, KeyOf, Reconcilable, SpecOf};
use crate::conditions;
use crate::error::PhaseError;
use crate::finalizer;
use crate::patch::status_patch;
use crate::store::{ObjectKey, ObjectStore};
use crate::trigger::Trigger;

/// Scratch state for one reconciliation pass of one object.
///
/// Owns the original snapshot (the base of every patch), the working copy
/// phases mutate, and the current remote state once discovered. Built fresh
/// for every pass and dropped when it ends.
pub struct Request<B: Binding> {
    key: ObjectKey,
    trigger: Trigger,
    original: B::Object,
    object: B::Object,
    current: Option<SpecOf<B>>,
    external_key: Option<KeyOf<B>>,
    binding: Arc<B>,
    objects: Arc<dyn ObjectStore<B::Object>>,
    audit: Arc<dyn AuditSink>,
}

impl<B: Binding> Request<B> {
    /// Start a pass over `object` as read from the object store
    pub fn new(
        object: B::Object,
        binding: Arc<B>,
        objects: Arc<dyn ObjectStore<B::Object>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            key: ObjectKey::of(&object),
            trigger: Trigger::of(&object),
            original: object.clone(),
            object,
            current: None,
            external_key: None,
            binding,
            objects,
            audit,
        }
    }

    /// Identity of the reconciled object
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Trigger this pass was classified as
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Object exactly as read at the start of the pass
    pub fn original(&self) -> &B::Object {
        &self.original
    }

    /// Working copy, including status written during this pass
    pub fn object(&self) -> &B::Object {
        &self.object
    }

    /// Desired state; never changes during a pass
    pub fn desired(&self) -> &SpecOf<B> {
        self.original.desired()
    }

    /// Remote state, `None` until found
    pub fn current(&self) -> Option<&SpecOf<B>> {
        self.current.as_ref()
    }

    /// Record the normalised remote state
    pub fn set_current(&mut self, current: SpecOf<B>) {
        self.current = Some(current);
    }

    /// Natural key resolved by `GetCurrentState`
    pub fn external_key(&self) -> Option<&KeyOf<B>> {
        self.external_key.as_ref()
    }

    /// Remember the resolved natural key for later phases
    pub fn set_external_key(&mut self, key: KeyOf<B>) {
        self.external_key = Some(key);
    }

    /// Binding for the object type
    pub fn binding(&self) -> Arc<B> {
        Arc::clone(&self.binding)
    }

    /// Whether the remote entity exists and matches the desired state
    pub fn in_desired_state(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current == self.desired())
    }

    /// Set a single condition and persist status
    pub async fn update_condition(&mut self, condition: Condition) -> Result<(), PhaseError> {
        self.update_conditions([condition]).await
    }

    /// Set conditions and persist status in one patch against the original snapshot
    pub async fn update_conditions(
        &mut self,
        updates: impl IntoIterator<Item = Condition> + Send,
    ) -> Result<(), PhaseError> {
        let now = Utc::now();
        let mut changed = false;
        for condition in updates {
            changed |= conditions::set_condition(self.object.conditions_mut(), condition, now);
        }
        if !changed {
            debug!(object = %self.key, "conditions unchanged");
            return Ok(());
        }
        self.persist_status().await
    }

    /// Write resolved identifiers into status, persisting only if they changed
    pub async fn record_identifiers(
        &mut self,
        key: &KeyOf<B>,
        entity_id: &str,
    ) -> Result<(), PhaseError> {
        let before = self.object.clone();
        self.binding
            .record_identifiers(&mut self.object, key, entity_id);
        self.persist_status_since(&before).await
    }

    /// Drop recorded identifiers and persist status
    pub async fn clear_identifiers(&mut self) -> Result<(), PhaseError> {
        let before = self.object.clone();
        self.binding.clear_identifiers(&mut self.object);
        self.persist_status_since(&before).await
    }

    /// Ensure the finalizer is present; returns whether it was added
    pub async fn add_finalizer(&mut self) -> Result<bool, PhaseError> {
        finalizer::add_finalizer(self.objects.as_ref(), &mut self.object).await
    }

    /// Remove the finalizer; returns whether it was removed
    pub async fn remove_finalizer(&mut self) -> Result<bool, PhaseError> {
        finalizer::remove_finalizer(self.objects.as_ref(), &mut self.object).await
    }

    /// Emit an audit event for the object
    pub fn audit(&self, action: AuditAction) {
        self.audit.record(
            &self.object.object_ref(&()),
            action,
            self.binding.describe(&self.object),
        );
    }

    async fn persist_status_since(&self, before: &B::Object) -> Result<(), PhaseError> {
        let changed = status_patch(before, &self.object)
            .map_err(|source| PhaseError::patch("status", source))?
            .is_some();
        if !changed {
            debug!(object = %self.key, "identifiers unchanged");
            return Ok(());
        }
        self.persist_status().await
    }

    async fn persist_status(&self) -> Result<(), PhaseError> {
        self.objects
            .patch_status(&self.original, &self.object)
            .await
            .map_err(|source| PhaseError::patch("status", source))
    }
}
