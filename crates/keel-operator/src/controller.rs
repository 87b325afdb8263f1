//! LdapIdentityProvider controller
//!
//! Adapts the reconciliation engine to `kube::runtime::Controller`: the
//! runtime owns the watch, the per-object work queue and the requeue timers,
//! the dispatcher owns everything that happens inside one pass.

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use keel_common::events::KubeAuditSink;
use keel_common::Error;
use keel_ldap::ocm::OcmClient;
use keel_ldap::secrets::KubeSecretResolver;
use keel_ldap::{LdapBinding, LdapIdentityProvider, CONTROLLER_NAME};
use keel_reconcile::{Dispatcher, ErrorKind, KubeObjectStore, ObjectKey, ReconcileError};

use crate::config::Settings;

/// Watch timeout; must stay below the API server's request timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Shared state of all reconciliation passes
pub struct Context {
    /// Engine bound to LdapIdentityProvider
    pub dispatcher: Dispatcher<LdapBinding>,
    /// Cancelled on shutdown so in-flight passes stop between phases
    pub cancel: CancellationToken,
}

impl Context {
    /// Context with a fresh cancellation token
    pub fn new(dispatcher: Dispatcher<LdapBinding>) -> Self {
        Self {
            dispatcher,
            cancel: CancellationToken::new(),
        }
    }
}

/// Run one reconciliation pass for an LdapIdentityProvider
pub async fn reconcile(
    idp: Arc<LdapIdentityProvider>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let key = ObjectKey::of(idp.as_ref());
    ctx.dispatcher
        .dispatch(&key, &ctx.cancel)
        .await
        .map(Action::from)
}

/// Requeue policy after a failed pass
///
/// Recoverable failures come back after the configured retry interval.
/// Fatal failures carry no override and fall back to the steady-state
/// interval so the object is looked at again without busy looping. A
/// cancelled pass is not rescheduled since the process is shutting down.
pub fn error_policy(
    idp: Arc<LdapIdentityProvider>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    match (error.kind(), error.retry_after()) {
        (_, Some(delay)) => Action::requeue(delay),
        (ErrorKind::Cancelled, None) => Action::await_change(),
        (kind, None) => {
            let delay = ctx.dispatcher.config().steady_state_interval;
            warn!(
                provider = %idp.name_any(),
                ?kind,
                retry_in_secs = delay.as_secs(),
                "no retry interval on error, using default"
            );
            Action::requeue(delay)
        }
    }
}

/// Build the production context
pub fn context(client: Client, settings: &Settings) -> Result<Context, Error> {
    let ocm = OcmClient::new(settings.ocm_config())?;
    let binding = LdapBinding::new(
        ocm.clone(),
        Arc::new(ocm),
        Arc::new(KubeSecretResolver::new(client.clone())),
    );
    let dispatcher = Dispatcher::new(
        Arc::new(binding),
        Arc::new(KubeObjectStore::<LdapIdentityProvider>::new(client.clone())),
        Arc::new(KubeAuditSink::new(client, CONTROLLER_NAME)),
        settings.reconcile_config(),
    );
    Ok(Context::new(dispatcher))
}

/// Watch LdapIdentityProvider objects until a shutdown signal arrives
pub async fn run(client: Client, settings: &Settings) -> Result<(), Error> {
    let ctx = Arc::new(context(client.clone(), settings)?);

    let api: Api<LdapIdentityProvider> = match settings.watch_namespace.as_deref() {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    info!(
        namespace = settings.watch_namespace.as_deref().unwrap_or("*"),
        ocm_url = %settings.ocm_url,
        "starting {CONTROLLER_NAME}"
    );

    Controller::new(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok((object, action)) => debug!(provider = %object.name, ?action, "reconciled"),
                Err(e) => error!(error = %e, "controller error"),
            }
            std::future::ready(())
        })
        .await;

    info!("{CONTROLLER_NAME} stopped");
    Ok(())
}
