//! Operator settings
//!
//! Every setting can be given as a flag or through the environment, which is
//! how the Deployment manifest configures it.

use std::time::Duration;

use clap::Args;
use keel_common::telemetry::LogFormat;
use keel_common::{DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RETRY_INTERVAL_SECS};
use keel_ldap::ocm::{OcmConfig, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_OCM_URL};
use keel_reconcile::ReconcileConfig;

/// Controller settings
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Settings {
    /// OCM API base URL
    #[arg(long, env = "OCM_URL", default_value = DEFAULT_OCM_URL)]
    pub ocm_url: String,

    /// Bearer token for the OCM API
    #[arg(long, env = "OCM_TOKEN", hide_env_values = true)]
    pub ocm_token: Option<String>,

    /// Seconds between re-verification of reconciled objects
    #[arg(long, env = "KEEL_RECONCILE_INTERVAL_SECS", default_value_t = DEFAULT_RECONCILE_INTERVAL_SECS)]
    pub reconcile_interval_secs: u64,

    /// Seconds before retrying a recoverable failure
    #[arg(long, env = "KEEL_RETRY_INTERVAL_SECS", default_value_t = DEFAULT_RETRY_INTERVAL_SECS)]
    pub retry_interval_secs: u64,

    /// Timeout of a single OCM request, in seconds
    #[arg(long, env = "KEEL_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    /// Log output format (json or pretty)
    #[arg(long, env = "KEEL_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    /// Only watch this namespace; all namespaces when unset
    #[arg(long, env = "KEEL_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,
}

impl Settings {
    /// Engine timing derived from the settings
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            steady_state_interval: Duration::from_secs(self.reconcile_interval_secs),
            retry_interval: Duration::from_secs(self.retry_interval_secs),
        }
    }

    /// OCM client configuration derived from the settings
    pub fn ocm_config(&self) -> OcmConfig {
        OcmConfig {
            base_url: self.ocm_url.clone(),
            token: self.ocm_token.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        TestCli::try_parse_from(std::iter::once("keel").chain(args.iter().copied()))
            .unwrap()
            .settings
    }

    #[test]
    fn flags_override_defaults() {
        let settings = parse(&[
            "--ocm-url",
            "https://ocm.example.com",
            "--ocm-token",
            "t0k3n",
            "--reconcile-interval-secs",
            "60",
            "--retry-interval-secs",
            "5",
            "--http-timeout-secs",
            "10",
            "--log-format",
            "pretty",
            "--watch-namespace",
            "identity",
        ]);

        assert_eq!(
            settings.reconcile_config(),
            ReconcileConfig {
                steady_state_interval: Duration::from_secs(60),
                retry_interval: Duration::from_secs(5),
            }
        );
        let ocm = settings.ocm_config();
        assert_eq!(ocm.base_url, "https://ocm.example.com");
        assert_eq!(ocm.token.as_deref(), Some("t0k3n"));
        assert_eq!(ocm.timeout, Duration::from_secs(10));
        assert_eq!(settings.log_format, LogFormat::Pretty);
        assert_eq!(settings.watch_namespace.as_deref(), Some("identity"));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(TestCli::try_parse_from(["keel", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        assert!(TestCli::try_parse_from(["keel", "--retry-interval-secs", "soon"]).is_err());
    }
}
