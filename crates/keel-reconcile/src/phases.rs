//! Generic phases shared by every binding
//!
//! Every phase is re-entrant: a pass may be cut short after any of them and
//! the next pass must converge without repeating completed external writes.

use std::time::Duration;

use async_trait::async_trait;
use keel_common::events::AuditAction;
use tracing::{debug, info};

use crate::binding::{Binding, Reconcilable};
use crate::conditions;
use crate::error::PhaseError;
use crate::pipeline::{Phase, Requeue};
use crate::request::Request;
use crate::store::ExternalStore;
use crate::trigger::Trigger;

/// Map a key resolution failure onto the phase taxonomy
fn resolve_error(source: keel_common::Error) -> PhaseError {
    match source {
        keel_common::Error::MissingIdentifier { what } => PhaseError::IdentifierMissing { what },
        other => PhaseError::lookup("prerequisite identifiers", other),
    }
}

/// Remote id recorded in status, if any
fn recorded_id<O: Reconcilable>(object: &O) -> Option<String> {
    object
        .external_id()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Ensure the finalizer (outside deletion) and mark `Reconciling`
pub struct Begin;

#[async_trait]
impl<B: Binding> Phase<B> for Begin {
    fn name(&self) -> &'static str {
        "Begin"
    }

    async fn run(&self, request: &mut Request<B>) -> Result<Requeue, PhaseError> {
        let trigger = request.trigger();
        info!(object = %request.key(), %trigger, "beginning reconciliation");

        if trigger != Trigger::Delete && request.add_finalizer().await? {
            debug!(object = %request.key(), "added finalizer");
        }

        request
            .update_condition(conditions::reconciling(trigger))
            .await?;
        Ok(Requeue::None)
    }
}

/// Resolve the natural key and read the remote entity
pub struct GetCurrentState;

#[async_trait]
impl<B: Binding> Phase<B> for GetCurrentState {
    fn name(&self) -> &'static str {
        "GetCurrentState"
    }

    async fn run(&self, request: &mut Request<B>) -> Result<Requeue, PhaseError> {
        let binding = request.binding();

        let key = binding
            .resolve_key(request.object())
            .await
            .map_err(resolve_error)?;

        if let Some(previous) = binding
            .recorded_key(request.object())
            .filter(|previous| *previous != key)
        {
            // A key field was edited: drop the entity under the previous key
            // so Apply recreates it under the new one.
            if let Some(id) = recorded_id(request.object()) {
                info!(
                    object = %request.key(),
                    remote_id = %id,
                    "natural key changed, deleting remote entity under previous key"
                );
                binding
                    .store()
                    .delete(&previous, &id)
                    .await
                    .map_err(|source| PhaseError::write("delete previous remote entity", source))?;
                request.audit(AuditAction::Deleted);
            }
            request.clear_identifiers().await?;
        }

        let entity = binding
            .store()
            .get(&key)
            .await
            .map_err(|source| PhaseError::lookup("remote entity", source))?;
        request.set_external_key(key.clone());

        let Some(entity) = entity else {
            debug!(object = %request.key(), "remote entity does not exist yet");
            return Ok(Requeue::None);
        };

        let id = binding
            .entity_id(&entity)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PhaseError::identifier_missing("remote entity id"))?
            .to_string();
        request.record_identifiers(&key, &id).await?;

        let current = binding.observe(request.object(), &entity);
        debug!(object = %request.key(), remote_id = %id, "found remote entity");
        request.set_current(current);
        Ok(Requeue::None)
    }
}

/// Create or update the remote entity unless it already matches
pub struct Apply;

#[async_trait]
impl<B: Binding> Phase<B> for Apply {
    fn name(&self) -> &'static str {
        "Apply"
    }

    async fn run(&self, request: &mut Request<B>) -> Result<Requeue, PhaseError> {
        if request.in_desired_state() {
            debug!(object = %request.key(), "remote entity already in desired state");
            return Ok(Requeue::None);
        }

        let binding = request.binding();
        let key = request
            .external_key()
            .cloned()
            .ok_or_else(|| PhaseError::identifier_missing("natural key"))?;
        let payload = binding
            .payload(request.object())
            .await
            .map_err(|source| PhaseError::PayloadFailed { source })?;

        if request.current().is_none() {
            info!(object = %request.key(), "creating remote entity");
            let entity = binding
                .store()
                .create(&key, &payload)
                .await
                .map_err(|source| PhaseError::write("create remote entity", source))?;
            let id = binding
                .entity_id(&entity)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| PhaseError::identifier_missing("created remote entity id"))?
                .to_string();

            // Record the id now so the next pass classifies as Update
            let recorded = request.record_identifiers(&key, &id).await;
            request.audit(AuditAction::Created);
            recorded?;
        } else {
            info!(object = %request.key(), "updating remote entity");
            binding
                .store()
                .update(&key, &payload)
                .await
                .map_err(|source| PhaseError::write("update remote entity", source))?;
            request.audit(AuditAction::Updated);
        }
        Ok(Requeue::None)
    }
}

/// Mark `Reconciled` and ask to be re-verified later
pub struct Complete {
    interval: Duration,
}

impl Complete {
    /// Requeue after `interval` on success
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl<B: Binding> Phase<B> for Complete {
    fn name(&self) -> &'static str {
        "Complete"
    }

    async fn run(&self, request: &mut Request<B>) -> Result<Requeue, PhaseError> {
        let trigger = request.trigger();
        request
            .update_condition(conditions::reconciled(trigger))
            .await?;
        info!(
            object = %request.key(),
            requeue_secs = self.interval.as_secs(),
            "completed reconciliation"
        );
        Ok(Requeue::After(self.interval))
    }
}

/// Delete the remote entity, once
pub struct Destroy;

#[async_trait]
impl<B: Binding> Phase<B> for Destroy {
    fn name(&self) -> &'static str {
        "Destroy"
    }

    async fn run(&self, request: &mut Request<B>) -> Result<Requeue, PhaseError> {
        let deleted = <B::Object as Reconcilable>::DELETED_CONDITION;
        if conditions::is_set(deleted, request.object().conditions()) {
            debug!(object = %request.key(), "remote entity already deleted");
            return Ok(Requeue::None);
        }

        let binding = request.binding();
        let key = match binding.recorded_key(request.object()) {
            Some(key) => Some(key),
            None => match binding.resolve_key(request.object()).await {
                Ok(key) => Some(key),
                Err(source) if source.is_not_found() => {
                    debug!(object = %request.key(), error = %source, "parent no longer exists");
                    None
                }
                Err(source) => return Err(resolve_error(source)),
            },
        };

        // A pass cut short between create and recording the id leaves the
        // entity reachable only by natural key.
        let target = match key {
            Some(key) => {
                let id = match recorded_id(request.object()) {
                    Some(id) => Some(id),
                    None => binding
                        .store()
                        .get(&key)
                        .await
                        .map_err(|source| PhaseError::lookup("remote entity", source))?
                        .map(|entity| {
                            binding
                                .entity_id(&entity)
                                .filter(|id| !id.is_empty())
                                .map(str::to_string)
                                .ok_or_else(|| PhaseError::identifier_missing("remote entity id"))
                        })
                        .transpose()?,
                };
                id.map(|id| (key, id))
            }
            None => None,
        };

        match target {
            Some((key, id)) => {
                info!(object = %request.key(), remote_id = %id, "deleting remote entity");
                binding
                    .store()
                    .delete(&key, &id)
                    .await
                    .map_err(|source| PhaseError::write("delete remote entity", source))?;
                request.audit(AuditAction::Deleted);
            }
            None => {
                info!(object = %request.key(), "no remote entity found, nothing to delete");
            }
        }

        request
            .update_condition(conditions::deleted(deleted, "remote entity has been deleted"))
            .await?;
        Ok(Requeue::None)
    }
}

/// Release the object by removing the finalizer
pub struct CompleteDestroy;

#[async_trait]
impl<B: Binding> Phase<B> for CompleteDestroy {
    fn name(&self) -> &'static str {
        "CompleteDestroy"
    }

    async fn run(&self, request: &mut Request<B>) -> Result<Requeue, PhaseError> {
        if request.remove_finalizer().await? {
            info!(object = %request.key(), "removed finalizer");
        }
        Ok(Requeue::None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keel_common::events::MemoryAuditSink;

    use super::*;
    use crate::finalizer::{finalizer_name, has_finalizer};
    use crate::testing::{
        deleting, reconciled, remote_widget, widget, FakeObjectStore, Widget, WidgetBinding,
        WidgetKey, WidgetSpec,
    };

    struct Harness {
        binding: Arc<WidgetBinding>,
        objects: Arc<FakeObjectStore<Widget>>,
        audit: Arc<MemoryAuditSink>,
    }

    impl Harness {
        fn new(object: &Widget) -> Self {
            Self {
                binding: Arc::new(WidgetBinding::new()),
                objects: Arc::new(FakeObjectStore::new(object.clone())),
                audit: Arc::new(MemoryAuditSink::new()),
            }
        }

        fn request(&self, object: Widget) -> Request<WidgetBinding> {
            Request::new(
                object,
                self.binding.clone(),
                self.objects.clone(),
                self.audit.clone(),
            )
        }
    }

    fn key() -> WidgetKey {
        WidgetKey::new("cid-1", "ldap1")
    }

    #[tokio::test]
    async fn begin_adds_finalizer_and_marks_reconciling() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        let requeue = Begin.run(&mut request).await.unwrap();

        assert_eq!(requeue, Requeue::None);
        assert!(has_finalizer(request.object()));
        assert!(conditions::is_set(
            conditions::RECONCILING,
            request.object().conditions()
        ));
        assert_eq!(h.objects.patch_calls(), 1);
    }

    #[tokio::test]
    async fn begin_on_delete_does_not_add_finalizer() {
        let mut obj = deleting(widget("ldap1", "c1"));
        obj.metadata.finalizers = None;
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        Begin.run(&mut request).await.unwrap();

        assert_eq!(h.objects.patch_calls(), 0);
        assert!(!has_finalizer(request.object()));
    }

    #[tokio::test]
    async fn get_current_state_leaves_current_empty_when_absent() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        GetCurrentState.run(&mut request).await.unwrap();

        assert!(request.current().is_none());
        assert_eq!(request.external_key(), Some(&key()));
        assert_eq!(h.objects.status_patch_calls(), 0);
    }

    #[tokio::test]
    async fn get_current_state_records_identifiers_when_found() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        h.binding
            .store()
            .seed(key(), remote_widget("idp-7", "ldap1", 1));
        let mut request = h.request(obj);

        GetCurrentState.run(&mut request).await.unwrap();

        let status = request.object().status.clone().unwrap_or_default();
        assert_eq!(status.cluster_id.as_deref(), Some("cid-1"));
        assert_eq!(status.external_id.as_deref(), Some("idp-7"));
        assert!(request.in_desired_state());
        assert_eq!(h.objects.status_patch_calls(), 1);
    }

    #[tokio::test]
    async fn get_current_state_reuses_recorded_cluster_id() {
        let mut obj = widget("ldap1", "c1");
        let status = obj.status.get_or_insert_with(Default::default);
        status.cluster_id = Some("cid-1".to_string());
        status.cluster = Some("c1".to_string());
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        GetCurrentState.run(&mut request).await.unwrap();

        assert_eq!(h.binding.cluster_lookups(), 0);
    }

    #[tokio::test]
    async fn get_current_state_does_not_rewrite_recorded_identifiers() {
        let obj = reconciled(widget("ldap1", "c1"));
        let h = Harness::new(&obj);
        h.binding
            .store()
            .seed(key(), remote_widget("idp-1", "ldap1", 1));
        let mut request = h.request(obj);

        GetCurrentState.run(&mut request).await.unwrap();

        assert!(request.in_desired_state());
        assert_eq!(h.objects.status_patch_calls(), 0);
    }

    #[tokio::test]
    async fn get_current_state_moves_entity_when_parent_changes() {
        let mut obj = reconciled(widget("ldap1", "c1"));
        obj.spec.cluster = "c2".to_string();
        let h = Harness::new(&obj);
        h.binding
            .store()
            .seed(key(), remote_widget("idp-1", "ldap1", 1));
        let mut request = h.request(obj);

        GetCurrentState.run(&mut request).await.unwrap();

        let store = h.binding.store();
        assert_eq!(h.binding.cluster_lookups(), 1);
        assert_eq!(store.delete_calls(), 1);
        assert!(store.entity(&key()).is_none());
        assert_eq!(h.audit.actions(), vec![AuditAction::Deleted]);
        assert_eq!(request.external_key(), Some(&WidgetKey::new("cid-2", "ldap1")));
        assert!(request.current().is_none());
        assert!(request.object().external_id().is_none());
    }

    #[tokio::test]
    async fn get_current_state_moves_entity_on_rename() {
        let mut obj = reconciled(widget("ldap1", "c1"));
        obj.spec.name = "ldap2".to_string();
        let h = Harness::new(&obj);
        h.binding
            .store()
            .seed(key(), remote_widget("idp-1", "ldap1", 1));
        let mut request = h.request(obj);

        GetCurrentState.run(&mut request).await.unwrap();

        assert_eq!(h.binding.cluster_lookups(), 0);
        assert_eq!(h.binding.store().delete_calls(), 1);
        assert!(h.binding.store().entity(&key()).is_none());
        assert_eq!(request.external_key(), Some(&WidgetKey::new("cid-1", "ldap2")));
        let status = request.object().status.clone().unwrap_or_default();
        assert_eq!(status.name, None);
        assert_eq!(status.cluster_id, None);
    }

    #[tokio::test]
    async fn get_current_state_keeps_identifiers_when_previous_delete_fails() {
        let mut obj = reconciled(widget("ldap1", "c1"));
        obj.spec.name = "ldap2".to_string();
        let h = Harness::new(&obj);
        h.binding.store().fail_writes();
        let mut request = h.request(obj);

        let err = GetCurrentState.run(&mut request).await.unwrap_err();

        assert!(matches!(err, PhaseError::WriteFailed { .. }));
        assert_eq!(request.object().external_id(), Some("idp-1"));
        assert_eq!(h.objects.status_patch_calls(), 0);
    }

    #[tokio::test]
    async fn get_current_state_maps_missing_cluster_id() {
        let obj = widget("ldap1", "pending-cluster");
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        let err = GetCurrentState.run(&mut request).await.unwrap_err();
        assert!(matches!(err, PhaseError::IdentifierMissing { .. }));
    }

    #[tokio::test]
    async fn get_current_state_lookup_error_is_lookup_failed() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        h.binding.store().fail_gets();
        let mut request = h.request(obj);

        let err = GetCurrentState.run(&mut request).await.unwrap_err();
        assert!(matches!(err, PhaseError::LookupFailed { .. }));
        assert!(request.current().is_none());
    }

    #[tokio::test]
    async fn apply_skips_when_in_desired_state() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        let mut request = h.request(obj.clone());
        request.set_external_key(key());
        request.set_current(obj.spec.clone());

        Apply.run(&mut request).await.unwrap();

        let store = h.binding.store();
        assert_eq!(store.create_calls(), 0);
        assert_eq!(store.update_calls(), 0);
        assert!(h.audit.actions().is_empty());
    }

    #[tokio::test]
    async fn apply_creates_once_when_absent() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        let mut request = h.request(obj.clone());
        request.set_external_key(key());

        Apply.run(&mut request).await.unwrap();

        let store = h.binding.store();
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.created_payloads(), vec![obj.spec.clone()]);
        assert_eq!(h.audit.actions(), vec![AuditAction::Created]);
        assert!(request.object().external_id().is_some());
    }

    #[tokio::test]
    async fn apply_create_without_id_is_identifier_missing() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        h.binding.store().omit_created_ids();
        let mut request = h.request(obj);
        request.set_external_key(key());

        let err = Apply.run(&mut request).await.unwrap_err();

        assert!(matches!(err, PhaseError::IdentifierMissing { .. }));
        assert!(err.kind().is_recoverable());
        assert!(request.object().external_id().is_none());
        assert_eq!(h.objects.status_patch_calls(), 0);
    }

    #[tokio::test]
    async fn apply_updates_on_single_field_drift() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        h.binding
            .store()
            .seed(key(), remote_widget("idp-7", "ldap1", 1));
        let mut request = h.request(obj.clone());
        request.set_external_key(key());
        request.set_current(WidgetSpec {
            size: obj.spec.size + 1,
            ..obj.spec.clone()
        });

        Apply.run(&mut request).await.unwrap();

        let store = h.binding.store();
        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.create_calls(), 0);
        assert_eq!(h.audit.actions(), vec![AuditAction::Updated]);
    }

    #[tokio::test]
    async fn apply_write_failure_is_write_failed() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        h.binding.store().fail_writes();
        let mut request = h.request(obj);
        request.set_external_key(key());

        let err = Apply.run(&mut request).await.unwrap_err();
        assert!(matches!(err, PhaseError::WriteFailed { .. }));
        assert!(h.audit.actions().is_empty());
    }

    #[tokio::test]
    async fn complete_marks_reconciled_and_requeues() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        let mut request = h.request(obj);
        Begin.run(&mut request).await.unwrap();

        let requeue = Complete::new(Duration::from_secs(300))
            .run(&mut request)
            .await
            .unwrap();

        assert_eq!(requeue, Requeue::After(Duration::from_secs(300)));
        let conds = request.object().conditions();
        assert!(conditions::is_set(conditions::RECONCILED, conds));
        assert!(conditions::is_set(conditions::RECONCILING, conds));
    }

    #[tokio::test]
    async fn complete_on_converged_object_writes_nothing() {
        let obj = widget("ldap1", "c1");
        let h = Harness::new(&obj);
        let mut first = h.request(obj);
        Begin.run(&mut first).await.unwrap();
        Complete::new(Duration::from_secs(300))
            .run(&mut first)
            .await
            .unwrap();
        let patches = h.objects.status_patch_calls();

        let mut second = h.request(first.object().clone());
        Begin.run(&mut second).await.unwrap();
        Complete::new(Duration::from_secs(300))
            .run(&mut second)
            .await
            .unwrap();

        assert_eq!(h.objects.status_patch_calls(), patches);
    }

    #[tokio::test]
    async fn destroy_deletes_recorded_entity() {
        let obj = deleting(widget("ldap1", "c1"));
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        Destroy.run(&mut request).await.unwrap();

        assert_eq!(h.binding.store().delete_calls(), 1);
        assert_eq!(h.audit.actions(), vec![AuditAction::Deleted]);
        assert!(conditions::is_set(
            conditions::DELETED,
            request.object().conditions()
        ));
    }

    #[tokio::test]
    async fn destroy_skips_when_already_deleted() {
        let mut obj = deleting(widget("ldap1", "c1"));
        obj.status
            .get_or_insert_with(Default::default)
            .conditions
            .push(conditions::deleted(conditions::DELETED, "gone"));
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        Destroy.run(&mut request).await.unwrap();

        assert_eq!(h.binding.store().delete_calls(), 0);
        assert!(h.audit.actions().is_empty());
    }

    #[tokio::test]
    async fn destroy_without_remote_entity_does_not_call_remote() {
        let mut obj = deleting(widget("ldap1", "c1"));
        obj.status = None;
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        Destroy.run(&mut request).await.unwrap();

        assert_eq!(h.binding.store().get_calls(), 1);
        assert_eq!(h.binding.store().delete_calls(), 0);
        assert!(conditions::is_set(
            conditions::DELETED,
            request.object().conditions()
        ));
    }

    #[tokio::test]
    async fn destroy_finds_unrecorded_entity_by_natural_key() {
        let mut obj = deleting(widget("ldap1", "c1"));
        obj.status = None;
        let h = Harness::new(&obj);
        h.binding
            .store()
            .seed(key(), remote_widget("idp-3", "ldap1", 1));
        let mut request = h.request(obj);

        Destroy.run(&mut request).await.unwrap();

        assert_eq!(h.binding.store().delete_calls(), 1);
        assert!(h.binding.store().entity(&key()).is_none());
        assert_eq!(h.audit.actions(), vec![AuditAction::Deleted]);
    }

    #[tokio::test]
    async fn destroy_with_vanished_parent_deletes_nothing() {
        let mut obj = deleting(widget("ldap1", "decommissioned"));
        obj.status = None;
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        Destroy.run(&mut request).await.unwrap();

        assert_eq!(h.binding.store().get_calls(), 0);
        assert_eq!(h.binding.store().delete_calls(), 0);
        assert!(conditions::is_set(
            conditions::DELETED,
            request.object().conditions()
        ));
    }

    #[tokio::test]
    async fn destroy_lookup_failure_is_surfaced() {
        let mut obj = deleting(widget("ldap1", "c1"));
        obj.status = None;
        let h = Harness::new(&obj);
        h.binding.store().fail_gets();
        let mut request = h.request(obj);

        let err = Destroy.run(&mut request).await.unwrap_err();

        assert!(matches!(err, PhaseError::LookupFailed { .. }));
        assert!(!conditions::is_set(
            conditions::DELETED,
            request.object().conditions()
        ));
    }

    #[tokio::test]
    async fn destroy_failure_is_surfaced_not_swallowed() {
        let obj = deleting(widget("ldap1", "c1"));
        let h = Harness::new(&obj);
        h.binding.store().fail_writes();
        let mut request = h.request(obj);

        let err = Destroy.run(&mut request).await.unwrap_err();

        assert!(matches!(err, PhaseError::WriteFailed { .. }));
        assert!(!conditions::is_set(
            conditions::DELETED,
            request.object().conditions()
        ));
    }

    #[tokio::test]
    async fn complete_destroy_removes_finalizer() {
        let obj = deleting(widget("ldap1", "c1"));
        assert!(obj
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.contains(&finalizer_name::<Widget>())));
        let h = Harness::new(&obj);
        let mut request = h.request(obj);

        let requeue = CompleteDestroy.run(&mut request).await.unwrap();

        assert_eq!(requeue, Requeue::None);
        assert!(!has_finalizer(request.object()));
        assert_eq!(h.objects.patch_calls(), 1);
    }
}
