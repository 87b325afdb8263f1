//! Finalizer management
//!
//! The finalizer blocks removal of an object until the remote entity it
//! describes has been cleaned up. Only `CompleteDestroy` removes it.

use kube::Resource;

use crate::binding::Reconcilable;
use crate::error::PhaseError;
use crate::store::ObjectStore;

/// Deterministic finalizer token: `lower(kind.group/finalizer)`
pub fn finalizer_name<K: Resource<DynamicType = ()>>() -> String {
    let kind = K::kind(&());
    let group = K::group(&());
    if group.is_empty() {
        format!("{kind}/finalizer").to_lowercase()
    } else {
        format!("{kind}.{group}/finalizer").to_lowercase()
    }
}

/// Whether the object carries the finalizer
pub fn has_finalizer<K: Resource<DynamicType = ()>>(object: &K) -> bool {
    let name = finalizer_name::<K>();
    object
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&name))
}

/// Add the finalizer, patching only when it was absent.
///
/// Returns whether a patch was issued. On failure `object` is left unchanged.
pub async fn add_finalizer<K: Reconcilable>(
    store: &dyn ObjectStore<K>,
    object: &mut K,
) -> Result<bool, PhaseError> {
    if has_finalizer(object) {
        return Ok(false);
    }

    let before = object.clone();
    object
        .meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer_name::<K>());

    if let Err(source) = store.patch(&before, object).await {
        *object = before;
        return Err(PhaseError::patch("finalizers", source));
    }
    Ok(true)
}

/// Remove the finalizer, patching only when it was present.
///
/// Returns whether a patch was issued. On failure `object` is left unchanged.
pub async fn remove_finalizer<K: Reconcilable>(
    store: &dyn ObjectStore<K>,
    object: &mut K,
) -> Result<bool, PhaseError> {
    if !has_finalizer(object) {
        return Ok(false);
    }

    let name = finalizer_name::<K>();
    let before = object.clone();
    let finalizers = &mut object.meta_mut().finalizers;
    if let Some(list) = finalizers.as_mut() {
        list.retain(|f| f != &name);
    }
    if finalizers.as_ref().is_some_and(Vec::is_empty) {
        *finalizers = None;
    }

    if let Err(source) = store.patch(&before, object).await {
        *object = before;
        return Err(PhaseError::patch("finalizers", source));
    }
    Ok(true)
}
