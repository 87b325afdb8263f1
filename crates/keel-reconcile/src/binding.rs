//! Per-resource glue between a reconciled object and its external store

use std::fmt;

use async_trait::async_trait;
use keel_common::crd::Condition;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::conditions;
use crate::store::ExternalStore;

/// An object the engine can reconcile
pub trait Reconcilable:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Normalised desired state, compared field by field against the remote state
    type Spec: Clone + PartialEq + fmt::Debug + Send + Sync;

    /// Condition type marking the remote entity as deleted
    const DELETED_CONDITION: &'static str = conditions::DELETED;

    /// Desired state declared by the user
    fn desired(&self) -> &Self::Spec;

    /// Status conditions
    fn conditions(&self) -> &[Condition];

    /// Mutable status conditions, creating the status if absent
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// Identifier of the remote entity, once recorded in status
    fn external_id(&self) -> Option<&str>;
}

/// Natural key type of a binding's external store
pub type KeyOf<B> = <<B as Binding>::Store as ExternalStore>::Key;
/// Payload type of a binding's external store
pub type PayloadOf<B> = <<B as Binding>::Store as ExternalStore>::Payload;
/// Entity type of a binding's external store
pub type EntityOf<B> = <<B as Binding>::Store as ExternalStore>::Entity;
/// Spec type of a binding's object
pub type SpecOf<B> = <<B as Binding>::Object as Reconcilable>::Spec;

/// Ties a [`Reconcilable`] object type to an [`ExternalStore`]
///
/// The engine's phases are generic; everything resource-specific (how the
/// natural key is found, how a remote entity is normalised, which ids are
/// written back to status) lives behind this trait.
#[async_trait]
pub trait Binding: Send + Sync + 'static {
    /// Reconciled object type
    type Object: Reconcilable;
    /// Remote store the object is converged into
    type Store: ExternalStore;

    /// The external store
    fn store(&self) -> &Self::Store;

    /// Resolve prerequisite identifiers and build the natural key.
    ///
    /// Should reuse identifiers already recorded in status. Returns
    /// `keel_common::Error::MissingIdentifier` when the remote system answered
    /// without an id the key needs.
    async fn resolve_key(&self, object: &Self::Object) -> Result<KeyOf<Self>, keel_common::Error>;

    /// Key the remote entity was last recorded under, built from status
    /// without I/O. Differs from [`Binding::resolve_key`] once the user edits
    /// a field the natural key is derived from.
    fn recorded_key(&self, object: &Self::Object) -> Option<KeyOf<Self>>;

    /// Remote identifier of an entity
    fn entity_id<'a>(&self, entity: &'a EntityOf<Self>) -> Option<&'a str>;

    /// Copy resolved identifiers into the object's status
    fn record_identifiers(&self, object: &mut Self::Object, key: &KeyOf<Self>, entity_id: &str);

    /// Forget every identifier [`Binding::record_identifiers`] wrote
    fn clear_identifiers(&self, object: &mut Self::Object);

    /// Normalise a remote entity into the desired-state shape
    fn observe(&self, object: &Self::Object, entity: &EntityOf<Self>) -> SpecOf<Self>;

    /// Build the create/update body from the desired state
    async fn payload(&self, object: &Self::Object) -> Result<PayloadOf<Self>, keel_common::Error>;

    /// Audit detail for the object
    fn describe(&self, object: &Self::Object) -> String;
}
