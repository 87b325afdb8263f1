//! OpenShift Cluster Manager (OCM) access

mod client;
pub mod model;

pub use client::{ClusterDirectory, OcmClient, OcmConfig, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_OCM_URL};
#[cfg(test)]
pub use client::MockClusterDirectory;
pub use model::{IdentityProvider, IdpKey, LdapSettings};
