//! LDAP identity providers for OCM-managed clusters
//!
//! Defines the `LdapIdentityProvider` resource and binds it to the
//! reconciliation engine: cluster ids and identity providers are resolved
//! through the OCM REST API, bind passwords and CA bundles through
//! Secrets and ConfigMaps in the object's namespace.

#![deny(missing_docs)]

pub mod binding;
pub mod crd;
pub mod ocm;
pub mod secrets;

pub use binding::{LdapBinding, IDENTITY_PROVIDER_DELETED};
pub use crd::{LdapIdentityProvider, LdapIdentityProviderSpec, LdapIdentityProviderStatus};

/// Controller name reported on Kubernetes events
pub const CONTROLLER_NAME: &str = "keel-ldap-controller";
