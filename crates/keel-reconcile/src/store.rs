//! Store contracts consumed by the engine
//!
//! [`ObjectStore`] reads and patches the reconciled object. [`ExternalStore`]
//! performs CRUD against the remote system the object describes.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use keel_common::{Error, FIELD_MANAGER};

use crate::patch::{metadata_patch, status_patch};

/// Identity of a reconciled object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn of<K: Resource>(object: &K) -> Self {
        Self {
            namespace: object.namespace(),
            name: object.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Reads and patches the reconciled object
#[async_trait]
pub trait ObjectStore<K: Send + Sync + 'static>: Send + Sync {
    /// Fetch the object, `None` if it no longer exists
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error>;

    /// Merge-patch the status sub-resource with the diff of `original` and `mutated`
    async fn patch_status(&self, original: &K, mutated: &K) -> Result<(), Error>;

    /// Merge-patch metadata with the diff of `original` and `mutated`
    async fn patch(&self, original: &K, mutated: &K) -> Result<(), Error>;
}

/// CRUD against the external system
///
/// Implementations must be safe for concurrent use across objects.
#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// Natural key of a remote entity (e.g. parent id plus display name)
    type Key: Clone + PartialEq + fmt::Debug + Send + Sync;
    /// Body sent on create and update
    type Payload: fmt::Debug + Send + Sync;
    /// Entity as the remote system reports it
    type Entity: fmt::Debug + Send + Sync;

    /// Look up the entity by natural key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Entity>, Error>;

    /// Create the entity
    async fn create(&self, key: &Self::Key, payload: &Self::Payload)
        -> Result<Self::Entity, Error>;

    /// Update the existing entity
    async fn update(&self, key: &Self::Key, payload: &Self::Payload)
        -> Result<Self::Entity, Error>;

    /// Delete the entity by id; deleting an absent id is not an error
    async fn delete(&self, key: &Self::Key, id: &str) -> Result<(), Error>;
}

/// [`ObjectStore`] backed by the Kubernetes API
pub struct KubeObjectStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeObjectStore<K> {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeObjectStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + DeserializeOwned,
{
    fn api(&self, namespace: Option<&str>) -> Api<K> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeObjectStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error> {
        Ok(self
            .api(key.namespace.as_deref())
            .get_opt(&key.name)
            .await?)
    }

    async fn patch_status(&self, original: &K, mutated: &K) -> Result<(), Error> {
        let Some(patch) = status_patch(original, mutated)? else {
            debug!(object = %original.name_any(), "status unchanged, skipping patch");
            return Ok(());
        };
        self.api(original.namespace().as_deref())
            .patch_status(
                &original.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn patch(&self, original: &K, mutated: &K) -> Result<(), Error> {
        let Some(patch) = metadata_patch(original, mutated)? else {
            debug!(object = %original.name_any(), "metadata unchanged, skipping patch");
            return Ok(());
        };
        self.api(original.namespace().as_deref())
            .patch(
                &original.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}
