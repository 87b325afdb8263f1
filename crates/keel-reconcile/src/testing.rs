//! In-memory stores and a sample resource for exercising the engine
//!
//! `Widget` is a small namespaced resource converged into
//! [`FakeExternalStore`]. The fakes count every call so tests can assert on
//! how many remote or local writes a pass issued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use keel_common::crd::Condition;
use keel_common::Error;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::binding::{Binding, Reconcilable};
use crate::finalizer::finalizer_name;
use crate::store::{ExternalStore, ObjectKey, ObjectStore};

/// Sample desired state
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "test.keel.dev",
    version = "v1",
    kind = "Widget",
    namespaced,
    status = "WidgetStatus"
)]
pub struct WidgetSpec {
    /// Remote name, part of the natural key
    pub name: String,
    /// Name of the parent the widget lives under
    pub cluster: String,
    /// A mutable field
    #[serde(default)]
    pub size: u32,
}

/// Sample status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
    /// Resolved parent id
    pub cluster_id: Option<String>,
    /// Parent name `cluster_id` was resolved from
    pub cluster: Option<String>,
    /// Name the remote widget was registered under
    pub name: Option<String>,
    /// Remote id
    pub external_id: Option<String>,
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Reconcilable for Widget {
    type Spec = WidgetSpec;

    fn desired(&self) -> &WidgetSpec {
        &self.spec
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }

    fn external_id(&self) -> Option<&str> {
        self.status.as_ref()?.external_id.as_deref()
    }
}

/// A fresh widget in namespace `default` with size 1
pub fn widget(name: &str, cluster: &str) -> Widget {
    let mut w = Widget::new(
        name,
        WidgetSpec {
            name: name.to_string(),
            cluster: cluster.to_string(),
            size: 1,
        },
    );
    w.metadata.namespace = Some("default".to_string());
    w
}

/// Mark a widget as registered as `idp-1` under cluster `cid-1`
pub fn reconciled(mut w: Widget) -> Widget {
    w.metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer_name::<Widget>());
    let status = w.status.get_or_insert_with(Default::default);
    status.cluster_id = Some("cid-1".to_string());
    status.cluster = Some(w.spec.cluster.clone());
    status.name = Some(w.spec.name.clone());
    status.external_id = Some("idp-1".to_string());
    w
}

/// Mark a widget as previously reconciled and now being deleted
pub fn deleting(w: Widget) -> Widget {
    let mut w = reconciled(w);
    w.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    w
}

/// Remote entity as the fake store reports it
pub fn remote_widget(id: &str, name: &str, size: u32) -> RemoteWidget {
    RemoteWidget {
        id: Some(id.to_string()),
        name: name.to_string(),
        size,
    }
}

/// Object store holding a single object in memory
pub struct FakeObjectStore<K> {
    object: Mutex<Option<K>>,
    patches: AtomicUsize,
    status_patches: Mutex<Vec<K>>,
    fail_get: AtomicBool,
    fail_patch: AtomicBool,
    fail_status: AtomicBool,
}

impl<K: Clone> FakeObjectStore<K> {
    /// Store holding `object`
    pub fn new(object: K) -> Self {
        Self::with(Some(object))
    }

    /// Store where the object no longer exists
    pub fn empty() -> Self {
        Self::with(None)
    }

    fn with(object: Option<K>) -> Self {
        Self {
            object: Mutex::new(object),
            patches: AtomicUsize::new(0),
            status_patches: Mutex::new(Vec::new()),
            fail_get: AtomicBool::new(false),
            fail_patch: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
        }
    }

    /// Metadata patches issued
    pub fn patch_calls(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    /// Status patches issued
    pub fn status_patch_calls(&self) -> usize {
        self.status_patches.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Object as sent with every status patch, in order
    pub fn status_history(&self) -> Vec<K> {
        self.status_patches
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Currently stored object
    pub fn stored(&self) -> Option<K> {
        self.object.lock().ok().and_then(|o| o.clone())
    }

    /// Make `get` fail
    pub fn fail_gets(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    /// Make metadata patches fail
    pub fn fail_patches(&self) {
        self.fail_patch.store(true, Ordering::SeqCst);
    }

    /// Make status patches fail
    pub fn fail_status_patches(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    fn store(&self, object: &K) {
        if let Ok(mut stored) = self.object.lock() {
            *stored = Some(object.clone());
        }
    }
}

#[async_trait]
impl<K: Clone + Send + Sync + 'static> ObjectStore<K> for FakeObjectStore<K> {
    async fn get(&self, _key: &ObjectKey) -> Result<Option<K>, Error> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::internal_with_context("object-store", "get failed"));
        }
        Ok(self.stored())
    }

    async fn patch_status(&self, _original: &K, mutated: &K) -> Result<(), Error> {
        if let Ok(mut history) = self.status_patches.lock() {
            history.push(mutated.clone());
        }
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Error::internal_with_context("object-store", "status patch failed"));
        }
        self.store(mutated);
        Ok(())
    }

    async fn patch(&self, _original: &K, mutated: &K) -> Result<(), Error> {
        self.patches.fetch_add(1, Ordering::SeqCst);
        if self.fail_patch.load(Ordering::SeqCst) {
            return Err(Error::internal_with_context("object-store", "patch failed"));
        }
        self.store(mutated);
        Ok(())
    }
}

/// Natural key of a remote widget
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WidgetKey {
    /// Parent id
    pub cluster_id: String,
    /// Widget name
    pub name: String,
}

impl WidgetKey {
    /// Build a key
    pub fn new(cluster_id: &str, name: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Remote representation of a widget
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteWidget {
    /// Remote id
    pub id: Option<String>,
    /// Remote name
    pub name: String,
    /// Size
    pub size: u32,
}

/// External store keeping remote widgets in memory
#[derive(Default)]
pub struct FakeExternalStore {
    entities: Mutex<HashMap<WidgetKey, RemoteWidget>>,
    created: Mutex<Vec<WidgetSpec>>,
    gets: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    fail_get: AtomicBool,
    fail_write: AtomicBool,
    omit_ids: AtomicBool,
}

impl FakeExternalStore {
    /// Put an entity in the store
    pub fn seed(&self, key: WidgetKey, entity: RemoteWidget) {
        if let Ok(mut entities) = self.entities.lock() {
            entities.insert(key, entity);
        }
    }

    /// Entity stored under `key`
    pub fn entity(&self, key: &WidgetKey) -> Option<RemoteWidget> {
        self.entities.lock().ok()?.get(key).cloned()
    }

    /// Make `get` fail with a transport error
    pub fn fail_gets(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    /// Make create, update and delete fail
    pub fn fail_writes(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }

    /// Make `create` answer with an entity that carries no id
    pub fn omit_created_ids(&self) {
        self.omit_ids.store(true, Ordering::SeqCst);
    }

    /// `get` calls
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// `create` calls
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// `update` calls
    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// `delete` calls
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Payloads passed to `create`, in order
    pub fn created_payloads(&self) -> Vec<WidgetSpec> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn check_write(&self, operation: &str) -> Result<(), Error> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(Error::external_status(operation, 503, "service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalStore for FakeExternalStore {
    type Key = WidgetKey;
    type Payload = WidgetSpec;
    type Entity = RemoteWidget;

    async fn get(&self, key: &WidgetKey) -> Result<Option<RemoteWidget>, Error> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::external("get widget", "connection refused"));
        }
        Ok(self.entity(key))
    }

    async fn create(&self, key: &WidgetKey, payload: &WidgetSpec) -> Result<RemoteWidget, Error> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_write("create widget")?;
        if let Ok(mut created) = self.created.lock() {
            created.push(payload.clone());
        }
        let mut entity = remote_widget(&format!("idp-{n}"), &payload.name, payload.size);
        if self.omit_ids.load(Ordering::SeqCst) {
            entity.id = None;
        }
        self.seed(key.clone(), entity.clone());
        Ok(entity)
    }

    async fn update(&self, key: &WidgetKey, payload: &WidgetSpec) -> Result<RemoteWidget, Error> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_write("update widget")?;
        let mut entity = self
            .entity(key)
            .ok_or_else(|| Error::not_found("widget", &key.name))?;
        entity.size = payload.size;
        self.seed(key.clone(), entity.clone());
        Ok(entity)
    }

    async fn delete(&self, key: &WidgetKey, id: &str) -> Result<(), Error> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_write("delete widget")?;
        if let Ok(mut entities) = self.entities.lock() {
            if entities.get(key).and_then(|e| e.id.as_deref()) == Some(id) {
                entities.remove(key);
            }
        }
        Ok(())
    }
}

/// Binding of [`Widget`] to [`FakeExternalStore`]
///
/// Clusters: `c1` resolves to `cid-1` and `c2` to `cid-2`; `pending-cluster`
/// exists without an id; anything else is not found.
pub struct WidgetBinding {
    store: FakeExternalStore,
    clusters: HashMap<String, Option<String>>,
    cluster_lookups: AtomicUsize,
}

impl Default for WidgetBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetBinding {
    /// Binding with the default clusters
    pub fn new() -> Self {
        let clusters = HashMap::from([
            ("c1".to_string(), Some("cid-1".to_string())),
            ("c2".to_string(), Some("cid-2".to_string())),
            ("pending-cluster".to_string(), None),
        ]);
        Self {
            store: FakeExternalStore::default(),
            clusters,
            cluster_lookups: AtomicUsize::new(0),
        }
    }

    /// Cluster name lookups performed
    pub fn cluster_lookups(&self) -> usize {
        self.cluster_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Binding for WidgetBinding {
    type Object = Widget;
    type Store = FakeExternalStore;

    fn store(&self) -> &FakeExternalStore {
        &self.store
    }

    async fn resolve_key(&self, object: &Widget) -> Result<WidgetKey, Error> {
        let recorded = object
            .status
            .as_ref()
            .filter(|s| s.cluster.as_deref() == Some(object.spec.cluster.as_str()))
            .and_then(|s| s.cluster_id.as_deref());
        if let Some(cluster_id) = recorded {
            return Ok(WidgetKey::new(cluster_id, &object.spec.name));
        }
        self.cluster_lookups.fetch_add(1, Ordering::SeqCst);
        let cluster_id = self
            .clusters
            .get(&object.spec.cluster)
            .ok_or_else(|| Error::not_found("cluster", &object.spec.cluster))?
            .clone()
            .ok_or_else(|| Error::missing_identifier("cluster id"))?;
        Ok(WidgetKey::new(&cluster_id, &object.spec.name))
    }

    fn recorded_key(&self, object: &Widget) -> Option<WidgetKey> {
        let status = object.status.as_ref()?;
        let cluster_id = status.cluster_id.as_deref()?;
        let name = status.name.as_deref().unwrap_or(&object.spec.name);
        Some(WidgetKey::new(cluster_id, name))
    }

    fn entity_id<'a>(&self, entity: &'a RemoteWidget) -> Option<&'a str> {
        entity.id.as_deref()
    }

    fn record_identifiers(&self, object: &mut Widget, key: &WidgetKey, entity_id: &str) {
        let status = object.status.get_or_insert_with(Default::default);
        status.cluster_id = Some(key.cluster_id.clone());
        status.cluster = Some(object.spec.cluster.clone());
        status.name = Some(key.name.clone());
        status.external_id = Some(entity_id.to_string());
    }

    fn clear_identifiers(&self, object: &mut Widget) {
        if let Some(status) = object.status.as_mut() {
            status.cluster_id = None;
            status.cluster = None;
            status.name = None;
            status.external_id = None;
        }
    }

    fn observe(&self, object: &Widget, entity: &RemoteWidget) -> WidgetSpec {
        WidgetSpec {
            name: entity.name.clone(),
            cluster: object.spec.cluster.clone(),
            size: entity.size,
        }
    }

    async fn payload(&self, object: &Widget) -> Result<WidgetSpec, Error> {
        Ok(object.spec.clone())
    }

    fn describe(&self, object: &Widget) -> String {
        format!("{} on cluster {}", object.spec.name, object.spec.cluster)
    }
}
