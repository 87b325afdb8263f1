//! Keel operator - reconciles LdapIdentityProvider resources into OCM

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use keel_common::telemetry::{init_telemetry, TelemetryConfig};
use keel_ldap::LdapIdentityProvider;
use keel_operator::{run, Settings};

/// Keel - declarative reconciliation of OCM identity providers
#[derive(Parser, Debug)]
#[command(name = "keel", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches LdapIdentityProvider objects and keeps the identity providers
    /// of the referenced OCM clusters in line with them.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print!("{}", serde_yaml::to_string(&LdapIdentityProvider::crd())?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        format: cli.settings.log_format,
    })?;

    match cli.command {
        None | Some(Commands::Controller) => {
            let client = Client::try_default().await?;
            run(client, &cli.settings).await?;
        }
    }

    Ok(())
}
