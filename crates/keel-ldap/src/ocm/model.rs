//! Wire types of the OCM clusters_mgmt v1 API

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crd::{LdapAttributes, MappingMethod};

/// `type` of LDAP identity providers
pub const LDAP_PROVIDER_TYPE: &str = "LDAPIdentityProvider";

/// Page of a list response
#[derive(Clone, Debug, Deserialize)]
pub struct ItemList<T> {
    /// Items on this page
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Cluster as returned by the cluster search
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Cluster {
    /// OCM cluster id
    #[serde(default)]
    pub id: Option<String>,
    /// Cluster name
    #[serde(default)]
    pub name: String,
}

/// Identity provider of a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct IdentityProvider {
    /// OCM identity provider id, assigned on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provider type (e.g. `LDAPIdentityProvider`)
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Display name, unique per cluster
    #[serde(default)]
    pub name: String,
    /// How identities map to users
    #[serde(default)]
    pub mapping_method: MappingMethod,
    /// LDAP settings, present for LDAP providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap: Option<LdapSettings>,
}

impl IdentityProvider {
    /// LDAP identity provider named `name`
    pub fn ldap(name: impl Into<String>, mapping_method: MappingMethod, ldap: LdapSettings) -> Self {
        Self {
            id: None,
            type_: LDAP_PROVIDER_TYPE.to_string(),
            name: name.into(),
            mapping_method,
            ldap: Some(ldap),
        }
    }
}

/// LDAP section of an identity provider
///
/// OCM never returns `bind_password`; it is write-only.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct LdapSettings {
    /// RFC 2255 search URL
    #[serde(default)]
    pub url: String,
    /// Bind DN
    #[serde(default)]
    pub bind_dn: String,
    /// Bind password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,
    /// PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    /// Skip TLS verification
    #[serde(default)]
    pub insecure: bool,
    /// Attribute mapping
    #[serde(default)]
    pub attributes: Attributes,
}

impl fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapSettings")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "<redacted>"))
            .field("ca", &self.ca.as_ref().map(|ca| ca.len()))
            .field("insecure", &self.insecure)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// LDAP attribute mapping in OCM field naming
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Attributes {
    /// Id attributes
    #[serde(default)]
    pub id: Vec<String>,
    /// Email attributes
    #[serde(default)]
    pub email: Vec<String>,
    /// Name attributes
    #[serde(default)]
    pub name: Vec<String>,
    /// Preferred user name attributes
    #[serde(default)]
    pub preferred_username: Vec<String>,
}

impl From<&LdapAttributes> for Attributes {
    fn from(a: &LdapAttributes) -> Self {
        Self {
            id: a.id.clone(),
            email: a.email.clone(),
            name: a.name.clone(),
            preferred_username: a.preferred_username.clone(),
        }
    }
}

impl From<&Attributes> for LdapAttributes {
    fn from(a: &Attributes) -> Self {
        Self {
            id: a.id.clone(),
            email: a.email.clone(),
            name: a.name.clone(),
            preferred_username: a.preferred_username.clone(),
        }
    }
}

/// Natural key of an identity provider: cluster id plus display name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdpKey {
    /// OCM cluster id
    pub cluster_id: String,
    /// Display name
    pub display_name: String,
}

impl IdpKey {
    /// Build a key
    pub fn new(cluster_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for IdpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster_id, self.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ldap_provider_serializes_in_ocm_naming() {
        let idp = IdentityProvider::ldap(
            "ldap1",
            MappingMethod::Claim,
            LdapSettings {
                url: "ldaps://ldap/ou=users?uid".to_string(),
                bind_dn: "cn=reader".to_string(),
                bind_password: Some("secret".to_string()),
                attributes: Attributes {
                    preferred_username: vec!["uid".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&idp).unwrap();
        assert_eq!(json["type"], "LDAPIdentityProvider");
        assert_eq!(json["mapping_method"], "claim");
        assert_eq!(json["ldap"]["bind_dn"], "cn=reader");
        assert_eq!(json["ldap"]["attributes"]["preferred_username"], json!(["uid"]));
        assert!(json.get("id").is_none());
        assert!(json["ldap"].get("ca").is_none());
    }

    #[test]
    fn response_without_optional_fields_parses() {
        let idp: IdentityProvider = serde_json::from_value(json!({
            "kind": "IdentityProvider",
            "id": "idp-1",
            "href": "/api/clusters_mgmt/v1/clusters/c/identity_providers/idp-1",
            "type": "LDAPIdentityProvider",
            "name": "ldap1",
            "mapping_method": "lookup",
            "ldap": {"url": "ldap://x", "insecure": true}
        }))
        .unwrap();
        assert_eq!(idp.id.as_deref(), Some("idp-1"));
        assert_eq!(idp.mapping_method, MappingMethod::Lookup);
        let ldap = idp.ldap.unwrap();
        assert!(ldap.insecure);
        assert_eq!(ldap.bind_password, None);
    }

    #[test]
    fn debug_redacts_bind_password() {
        let settings = LdapSettings {
            bind_password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let out = format!("{settings:?}");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn key_display() {
        assert_eq!(IdpKey::new("abc", "ldap1").to_string(), "abc/ldap1");
    }
}
