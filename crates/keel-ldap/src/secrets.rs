//! Resolution of referenced Secrets and ConfigMaps
//!
//! The bind password and CA bundle are referenced by name from the object spec and
//! read at payload build time. Their values never reach the object's status.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::Api;
use kube::Client;

use keel_common::Error;

/// Secret key holding the LDAP bind password
pub const BIND_PASSWORD_KEY: &str = "bindPassword";

/// ConfigMap key holding the PEM CA bundle
pub const CA_KEY: &str = "ca.crt";

/// Reads values out of Secrets and ConfigMaps
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Value of `key` in Secret `namespace/name`
    async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<String, Error>;

    /// Value of `key` in ConfigMap `namespace/name`
    async fn config_map_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, Error>;
}

/// [`SecretResolver`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretResolver {
    client: Client,
}

impl KubeSecretResolver {
    /// Create a resolver using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn missing_key(kind: &str, namespace: &str, name: &str, key: &str) -> Error {
    Error::validation_for(
        format!("{kind} {namespace}/{name}"),
        format!("missing key {key}"),
    )
}

#[async_trait]
impl SecretResolver for KubeSecretResolver {
    async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<String, Error> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::not_found("Secret", format!("{namespace}/{name}")))?;

        if let Some(value) = secret.string_data.as_ref().and_then(|d| d.get(key)) {
            return Ok(value.clone());
        }
        let bytes = secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .ok_or_else(|| missing_key("Secret", namespace, name, key))?;
        String::from_utf8(bytes.0.clone()).map_err(|_| {
            Error::validation_for(
                format!("Secret {namespace}/{name}"),
                format!("key {key} is not valid UTF-8"),
            )
        })
    }

    async fn config_map_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, Error> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = config_maps
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::not_found("ConfigMap", format!("{namespace}/{name}")))?;

        config_map
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .cloned()
            .ok_or_else(|| missing_key("ConfigMap", namespace, name, key))
    }
}
