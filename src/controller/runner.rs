//! Controller runner - builds one controller future per ACL kind
//!
//! Each `build_*` function returns a boxed future so the caller decides how
//! to drive them. This keeps controller construction pure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};

use super::context::Context;
use super::reconcile::{error_policy, reconcile};
use crate::config::OperatorConfig;
use crate::consul::AclClient;
use crate::crd::{AclAuthMethod, AclBinding, AclRole};
use crate::sync::AclResource;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watched<K: AclResource>(client: Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the controller for a single kind
pub fn build_controller<K: AclResource>(
    client: Client,
    ctx: Arc<Context<K>>,
    namespace: Option<&str>,
    label: &'static str,
) -> ControllerFuture {
    let api: Api<K> = watched(client, namespace);
    tracing::info!(namespace = namespace.unwrap_or("*"), "- {label} controller");

    Box::pin(
        Controller::new(api, watcher_config())
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result(label)),
    )
}

/// Build the binding controller
///
/// Bindings also requeue when the auth method they reference changes, so a
/// binding waiting on its auth method syncs as soon as the method exists.
pub fn build_binding_controller(
    client: Client,
    ctx: Arc<Context<AclBinding>>,
    namespace: Option<&str>,
) -> ControllerFuture {
    let bindings: Api<AclBinding> = watched(client.clone(), namespace);
    let auth_methods: Api<AclAuthMethod> = watched(client, namespace);
    tracing::info!(namespace = namespace.unwrap_or("*"), "- AclBinding controller");

    let controller = Controller::new(bindings, watcher_config());
    let bindings_store = controller.store();

    Box::pin(
        controller
            .watches(auth_methods, watcher_config(), move |method| {
                let ns = method.namespace().unwrap_or_default();
                let name = method.name_any();
                bindings_store
                    .state()
                    .into_iter()
                    .filter(|b| {
                        b.namespace().as_deref() == Some(ns.as_str())
                            && b.spec.auth_method == name
                    })
                    .map(|b| ObjectRef::from_obj(&*b))
                    .collect::<Vec<_>>()
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("AclBinding")),
    )
}

/// Build controllers for all three ACL kinds
pub fn build_controllers(
    client: Client,
    acl: Arc<dyn AclClient>,
    config: Arc<OperatorConfig>,
) -> Vec<ControllerFuture> {
    let namespace = config.operator.watch_namespace.clone();
    let namespace = namespace.as_deref();

    let roles =
        Arc::new(Context::<AclRole>::builder(client.clone(), acl.clone(), config.clone()).build());
    let methods = Arc::new(
        Context::<AclAuthMethod>::builder(client.clone(), acl.clone(), config.clone()).build(),
    );
    let bindings = Arc::new(Context::<AclBinding>::builder(client.clone(), acl, config).build());

    vec![
        build_controller(client.clone(), roles, namespace, "AclRole"),
        build_controller(client.clone(), methods, namespace, "AclAuthMethod"),
        build_binding_controller(client, bindings, namespace),
    ]
}

/// Log each reconciliation result under the kind it belongs to
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    kind: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(outcome) => tracing::trace!(kind, ?outcome, "reconciled"),
            Err(e) => tracing::warn!(kind, error = ?e, "reconcile loop reported an error"),
        }
        std::future::ready(())
    }
}
