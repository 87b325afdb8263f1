//! Keel operator: runs the LdapIdentityProvider controller

pub mod config;
pub mod controller;

pub use config::Settings;
pub use controller::{error_policy, reconcile, run, Context};
