//! OCM REST client
//!
//! Thin JSON-over-HTTP client for the clusters_mgmt v1 endpoints the
//! identity provider binding needs. Every failure is folded into
//! [`keel_common::Error::External`] carrying the remote operation and HTTP
//! status; a 404 on delete is treated as already gone.

use std::time::Duration;

use async_trait::async_trait;
use keel_common::Error;
use keel_reconcile::ExternalStore;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::model::{Cluster, IdentityProvider, IdpKey, ItemList};

/// Default OCM API endpoint
pub const DEFAULT_OCM_URL: &str = "https://api.openshift.com";

/// Default timeout of a single HTTP request
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const CLUSTERS_PATH: &str = "/api/clusters_mgmt/v1/clusters";

/// Connection settings
#[derive(Clone, Debug)]
pub struct OcmConfig {
    /// API base URL
    pub base_url: String,
    /// Bearer token, if the endpoint requires one
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for OcmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OCM_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Resolves cluster names to OCM cluster ids
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterDirectory: Send + Sync {
    /// Id of the cluster named `name`.
    ///
    /// `NotFound` when no such cluster exists; `MissingIdentifier` when OCM
    /// answered without an id.
    async fn cluster_id(&self, name: &str) -> Result<String, Error>;
}

/// Client for the OCM clusters_mgmt API
#[derive(Clone)]
pub struct OcmClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl OcmClient {
    /// Build a client from settings
    pub fn new(config: OcmConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                Error::internal_with_context("ocm-client", format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response, Error> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::external(operation, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::external_status(
            operation,
            status.as_u16(),
            format!("{status}: {body}"),
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<T, Error> {
        self.send(operation, builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::serialization(format!("{operation}: invalid response body: {e}")))
    }

    /// Find a cluster by name
    pub async fn find_cluster(&self, name: &str) -> Result<Option<Cluster>, Error> {
        let search = format!("name = '{name}'");
        let list: ItemList<Cluster> = self
            .send_json(
                "get cluster",
                self.request(Method::GET, CLUSTERS_PATH)
                    .query(&[("search", search.as_str()), ("size", "1")]),
            )
            .await?;
        Ok(list.items.into_iter().next())
    }

    fn providers_path(cluster_id: &str) -> String {
        format!("{CLUSTERS_PATH}/{cluster_id}/identity_providers")
    }

    /// All identity providers of a cluster
    pub async fn list_identity_providers(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<IdentityProvider>, Error> {
        let list: ItemList<IdentityProvider> = self
            .send_json(
                "list identity providers",
                self.request(Method::GET, &Self::providers_path(cluster_id)),
            )
            .await?;
        Ok(list.items)
    }

    /// Identity provider of a cluster with the given display name
    pub async fn find_identity_provider(
        &self,
        cluster_id: &str,
        name: &str,
    ) -> Result<Option<IdentityProvider>, Error> {
        Ok(self
            .list_identity_providers(cluster_id)
            .await?
            .into_iter()
            .find(|idp| idp.name == name))
    }

    /// Register an identity provider
    pub async fn create_identity_provider(
        &self,
        cluster_id: &str,
        idp: &IdentityProvider,
    ) -> Result<IdentityProvider, Error> {
        self.send_json(
            "create identity provider",
            self.request(Method::POST, &Self::providers_path(cluster_id))
                .json(idp),
        )
        .await
    }

    /// Patch an existing identity provider
    pub async fn patch_identity_provider(
        &self,
        cluster_id: &str,
        id: &str,
        idp: &IdentityProvider,
    ) -> Result<IdentityProvider, Error> {
        let path = format!("{}/{}", Self::providers_path(cluster_id), id);
        self.send_json(
            "update identity provider",
            self.request(Method::PATCH, &path).json(idp),
        )
        .await
    }

    /// Delete an identity provider; an already absent provider is success
    pub async fn delete_identity_provider(&self, cluster_id: &str, id: &str) -> Result<(), Error> {
        let path = format!("{}/{}", Self::providers_path(cluster_id), id);
        match self
            .send("delete identity provider", self.request(Method::DELETE, &path))
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::External {
                status: Some(code), ..
            }) if code == StatusCode::NOT_FOUND.as_u16() => {
                debug!(cluster_id, id, "identity provider already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ClusterDirectory for OcmClient {
    async fn cluster_id(&self, name: &str) -> Result<String, Error> {
        let cluster = self
            .find_cluster(name)
            .await?
            .ok_or_else(|| Error::not_found("cluster", name))?;
        cluster
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::missing_identifier("cluster id"))
    }
}

#[async_trait]
impl ExternalStore for OcmClient {
    type Key = IdpKey;
    type Payload = IdentityProvider;
    type Entity = IdentityProvider;

    async fn get(&self, key: &IdpKey) -> Result<Option<IdentityProvider>, Error> {
        self.find_identity_provider(&key.cluster_id, &key.display_name)
            .await
    }

    async fn create(
        &self,
        key: &IdpKey,
        payload: &IdentityProvider,
    ) -> Result<IdentityProvider, Error> {
        self.create_identity_provider(&key.cluster_id, payload).await
    }

    async fn update(
        &self,
        key: &IdpKey,
        payload: &IdentityProvider,
    ) -> Result<IdentityProvider, Error> {
        let id = self
            .find_identity_provider(&key.cluster_id, &key.display_name)
            .await?
            .and_then(|idp| idp.id)
            .ok_or_else(|| Error::not_found("identity provider", key.to_string()))?;
        self.patch_identity_provider(&key.cluster_id, &id, payload)
            .await
    }

    async fn delete(&self, key: &IdpKey, id: &str) -> Result<(), Error> {
        self.delete_identity_provider(&key.cluster_id, id).await
    }
}
