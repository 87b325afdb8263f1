//! Binding of `LdapIdentityProvider` to OCM identity providers

use std::sync::Arc;

use async_trait::async_trait;
use keel_common::crd::Condition;
use keel_common::Error;
use keel_reconcile::{Binding, ExternalStore, Reconcilable};
use kube::ResourceExt;

use crate::crd::{LdapIdentityProvider, LdapIdentityProviderSpec};
use crate::ocm::model::Attributes;
use crate::ocm::{ClusterDirectory, IdentityProvider, IdpKey, LdapSettings, OcmClient};
use crate::secrets::{SecretResolver, BIND_PASSWORD_KEY, CA_KEY};

/// Condition set once the OCM identity provider has been deleted
pub const IDENTITY_PROVIDER_DELETED: &str = "IdentityProviderDeleted";

impl Reconcilable for LdapIdentityProvider {
    type Spec = LdapIdentityProviderSpec;

    const DELETED_CONDITION: &'static str = IDENTITY_PROVIDER_DELETED;

    fn desired(&self) -> &LdapIdentityProviderSpec {
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
        self.status.as_ref()?.provider_id.as_deref()
    }
}

/// Converges `LdapIdentityProvider` objects into OCM
///
/// Generic over the identity provider store so the engine can be exercised
/// against an in-memory store; production uses [`OcmClient`].
pub struct LdapBinding<S = OcmClient> {
    store: S,
    directory: Arc<dyn ClusterDirectory>,
    secrets: Arc<dyn SecretResolver>,
}

impl<S> LdapBinding<S> {
    /// Create a binding
    pub fn new(store: S, directory: Arc<dyn ClusterDirectory>, secrets: Arc<dyn SecretResolver>) -> Self {
        Self {
            store,
            directory,
            secrets,
        }
    }
}

fn recorded_cluster_id(object: &LdapIdentityProvider) -> Option<&str> {
    object
        .status
        .as_ref()?
        .cluster_id
        .as_deref()
        .filter(|id| !id.is_empty())
}

/// Recorded cluster id, provided it was resolved from the current `clusterName`
fn reusable_cluster_id(object: &LdapIdentityProvider) -> Option<&str> {
    let recorded_name = object.status.as_ref()?.cluster_name.as_deref();
    if recorded_name != Some(object.spec.cluster_name.as_str()) {
        return None;
    }
    recorded_cluster_id(object)
}

#[async_trait]
impl<S> Binding for LdapBinding<S>
where
    S: ExternalStore<Key = IdpKey, Payload = IdentityProvider, Entity = IdentityProvider>
        + 'static,
{
    type Object = LdapIdentityProvider;
    type Store = S;

    fn store(&self) -> &S {
        &self.store
    }

    async fn resolve_key(&self, object: &LdapIdentityProvider) -> Result<IdpKey, Error> {
        if let Some(cluster_id) = reusable_cluster_id(object) {
            return Ok(IdpKey::new(cluster_id, &object.spec.display_name));
        }
        let cluster_id = self.directory.cluster_id(&object.spec.cluster_name).await?;
        Ok(IdpKey::new(cluster_id, &object.spec.display_name))
    }

    fn recorded_key(&self, object: &LdapIdentityProvider) -> Option<IdpKey> {
        let cluster_id = recorded_cluster_id(object)?;
        let display_name = object
            .status
            .as_ref()
            .and_then(|s| s.display_name.as_deref())
            .unwrap_or(&object.spec.display_name);
        Some(IdpKey::new(cluster_id, display_name))
    }

    fn entity_id<'a>(&self, entity: &'a IdentityProvider) -> Option<&'a str> {
        entity.id.as_deref()
    }

    fn record_identifiers(&self, object: &mut LdapIdentityProvider, key: &IdpKey, entity_id: &str) {
        let status = object.status.get_or_insert_with(Default::default);
        status.cluster_id = Some(key.cluster_id.clone());
        status.cluster_name = Some(object.spec.cluster_name.clone());
        status.provider_id = Some(entity_id.to_string());
        status.display_name = Some(key.display_name.clone());
    }

    fn clear_identifiers(&self, object: &mut LdapIdentityProvider) {
        if let Some(status) = object.status.as_mut() {
            status.cluster_id = None;
            status.cluster_name = None;
            status.provider_id = None;
            status.display_name = None;
        }
    }

    fn observe(&self, object: &LdapIdentityProvider, entity: &IdentityProvider) -> LdapIdentityProviderSpec {
        // OCM never returns secret material or object references; those are taken from desired
        let ldap = entity.ldap.clone().unwrap_or_default();
        LdapIdentityProviderSpec {
            cluster_name: object.spec.cluster_name.clone(),
            display_name: entity.name.clone(),
            bind_password: object.spec.bind_password.clone(),
            ca: object.spec.ca.clone(),
            mapping_method: entity.mapping_method,
            url: ldap.url,
            bind_dn: ldap.bind_dn,
            insecure: ldap.insecure,
            attributes: (&ldap.attributes).into(),
        }
    }

    async fn payload(&self, object: &LdapIdentityProvider) -> Result<IdentityProvider, Error> {
        let namespace = object.namespace().unwrap_or_default();
        let spec = &object.spec;

        let bind_password = self
            .secrets
            .secret_value(&namespace, &spec.bind_password.name, BIND_PASSWORD_KEY)
            .await?;
        let ca = match &spec.ca {
            Some(ca) => Some(
                self.secrets
                    .config_map_value(&namespace, &ca.name, CA_KEY)
                    .await?,
            ),
            None => None,
        };

        Ok(IdentityProvider::ldap(
            &spec.display_name,
            spec.mapping_method,
            LdapSettings {
                url: spec.url.clone(),
                bind_dn: spec.bind_dn.clone(),
                bind_password: Some(bind_password),
                ca,
                insecure: spec.insecure,
                attributes: Attributes::from(&spec.attributes),
            },
        ))
    }

    fn describe(&self, object: &LdapIdentityProvider) -> String {
        let cluster = recorded_cluster_id(object).unwrap_or(&object.spec.cluster_name);
        format!(
            "identity provider {} on cluster {}",
            object.spec.display_name, cluster
        )
    }
}
