//! LdapIdentityProvider CRD
//!
//! An LdapIdentityProvider declares an LDAP identity provider that should
//! exist on an OpenShift Cluster Manager (OCM) managed cluster. The operator
//! converges the identity provider registered in OCM toward this spec.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use keel_common::crd::{Condition, LocalObjectRef};

/// LdapIdentityProvider declares an LDAP identity provider for a managed cluster.
///
/// Example:
/// ```yaml
/// apiVersion: keel.dev/v1alpha1
/// kind: LdapIdentityProvider
/// metadata:
///   name: ldap1
///   namespace: identity
/// spec:
///   clusterName: c1
///   displayName: ldap1
///   url: ldaps://ldap.example.com/ou=users,dc=example,dc=com?uid
///   bindDN: cn=reader,dc=example,dc=com
///   bindPassword:
///     name: ldap-bind-password
///   ca:
///     name: ldap-ca
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1alpha1",
    kind = "LdapIdentityProvider",
    namespaced,
    shortname = "ldapidp",
    status = "LdapIdentityProviderStatus",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.providerID"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LdapIdentityProviderSpec {
    /// Name of the OCM cluster the identity provider belongs to
    pub cluster_name: String,

    /// Name the identity provider is registered under (the natural key in OCM)
    pub display_name: String,

    /// How identities are mapped to users
    #[serde(default)]
    pub mapping_method: MappingMethod,

    /// RFC 2255 LDAP URL used to search for users
    pub url: String,

    /// DN to bind with during the search phase
    #[serde(default, rename = "bindDN")]
    pub bind_dn: String,

    /// Secret (key `bindPassword`) holding the password for `bindDN`
    pub bind_password: LocalObjectRef,

    /// ConfigMap (key `ca.crt`) holding the PEM CA bundle for the LDAP server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<LocalObjectRef>,

    /// Skip TLS verification when talking to the LDAP server
    #[serde(default)]
    pub insecure: bool,

    /// LDAP attributes mapped onto the OpenShift identity
    #[serde(default)]
    pub attributes: LdapAttributes,
}

/// Identity mapping method
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MappingMethod {
    /// Provision a user with the identity's preferred user name (fails on conflict)
    #[default]
    Claim,
    /// Look up an existing identity, user identity mapping and user
    Lookup,
    /// Provision a user with a generated name on conflict
    Generate,
    /// Map the identity to an existing user of the same name
    Add,
}

/// LDAP attributes used to build the OpenShift identity
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LdapAttributes {
    /// Attributes used as the user id
    #[serde(default)]
    pub id: Vec<String>,

    /// Attributes used as the email address
    #[serde(default)]
    pub email: Vec<String>,

    /// Attributes used as the display name
    #[serde(default)]
    pub name: Vec<String>,

    /// Attributes used as the preferred user name
    #[serde(default)]
    pub preferred_username: Vec<String>,
}

/// LdapIdentityProvider status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LdapIdentityProviderStatus {
    /// OCM id of the cluster named by `spec.clusterName`
    #[serde(default, rename = "clusterID", skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    /// Cluster name `clusterID` was resolved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// OCM id of the identity provider
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Name the identity provider was registered under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Conditions representing reconciliation progress
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, Resource};

    fn sample_spec() -> LdapIdentityProviderSpec {
        LdapIdentityProviderSpec {
            cluster_name: "c1".to_string(),
            display_name: "ldap1".to_string(),
            url: "ldaps://ldap.example.com/ou=users?uid".to_string(),
            bind_dn: "cn=reader".to_string(),
            bind_password: LocalObjectRef::new("ldap-bind-password"),
            ..Default::default()
        }
    }

    #[test]
    fn spec_uses_openshift_field_names() {
        let json = serde_json::to_value(sample_spec()).unwrap();
        assert_eq!(json["clusterName"], "c1");
        assert_eq!(json["displayName"], "ldap1");
        assert_eq!(json["bindDN"], "cn=reader");
        assert_eq!(json["bindPassword"]["name"], "ldap-bind-password");
        assert_eq!(json["mappingMethod"], "claim");
        assert!(json.get("ca").is_none());
    }

    #[test]
    fn spec_defaults_optional_fields() {
        let spec: LdapIdentityProviderSpec = serde_json::from_value(serde_json::json!({
            "clusterName": "c1",
            "displayName": "ldap1",
            "url": "ldap://ldap",
            "bindPassword": {"name": "pw"}
        }))
        .unwrap();
        assert_eq!(spec.mapping_method, MappingMethod::Claim);
        assert_eq!(spec.bind_dn, "");
        assert!(!spec.insecure);
        assert_eq!(spec.attributes, LdapAttributes::default());
    }

    #[test]
    fn status_uses_id_field_names() {
        let status = LdapIdentityProviderStatus {
            cluster_id: Some("abc".to_string()),
            cluster_name: Some("c1".to_string()),
            provider_id: Some("def".to_string()),
            display_name: Some("ldap1".to_string()),
            conditions: vec![],
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["clusterID"], "abc");
        assert_eq!(json["clusterName"], "c1");
        assert_eq!(json["providerID"], "def");
        assert_eq!(json["displayName"], "ldap1");
    }

    #[test]
    fn crd_identity() {
        let crd = LdapIdentityProvider::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("ldapidentityproviders.keel.dev")
        );
        assert_eq!(LdapIdentityProvider::kind(&()), "LdapIdentityProvider");
        assert_eq!(LdapIdentityProvider::group(&()), keel_common::KEEL_GROUP);
    }
}
