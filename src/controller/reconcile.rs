//! Reconciliation of one ACL resource against Consul
//!
//! Every pass re-reads the object and the Consul state, so a pass that was
//! interrupted leaves nothing behind that the next pass cannot finish.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::context::Context;
use crate::crd::{external_name, AclStatus, HealthStatus};
use crate::events::{acl_event, actions, reasons};
use crate::retry::backoff_delay;
use crate::sync::{delete_external, evaluate, synchronize, AclResource, SyncAction};
use crate::Error;

/// Key used for per-object bookkeeping
pub fn object_key<K: AclResource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Check whether the finalizer is present on the object
pub fn has_finalizer<K: AclResource>(obj: &K) -> bool {
    obj.finalizers().iter().any(|f| f == K::FINALIZER)
}

/// Reconcile an ACL resource
///
/// The pass runs under the configured deadline. Expiry abandons the pass at
/// its next await point and reports a retryable [`Error::Timeout`].
#[instrument(
    skip(obj, ctx),
    fields(kind = %K::kind(&()), namespace = %obj.namespace().unwrap_or_default(), name = %obj.name_any())
)]
pub async fn reconcile<K: AclResource>(obj: Arc<K>, ctx: Arc<Context<K>>) -> Result<Action, Error> {
    let key = object_key(obj.as_ref());
    let deadline = ctx.config.reconcile_timeout();

    let result = match tokio::time::timeout(deadline, reconcile_pass(obj.as_ref(), &ctx)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(deadline)),
    };

    if result.is_ok() {
        ctx.reset_failures(&key);
    }
    result
}

/// Requeue policy for failed passes
///
/// Retryable errors back off exponentially per object; anything else waits
/// the maximum delay.
pub fn error_policy<K: AclResource>(obj: Arc<K>, error: &Error, ctx: Arc<Context<K>>) -> Action {
    let key = object_key(obj.as_ref());
    let attempt = ctx.record_failure(&key);
    let (base, max) = ctx.config.backoff();
    let delay = if error.is_retryable() {
        backoff_delay(attempt, base, max)
    } else {
        max
    };

    error!(
        ?error,
        object = %key,
        attempt,
        retry_in_ms = delay.as_millis(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}

async fn reconcile_pass<K: AclResource>(obj: &K, ctx: &Context<K>) -> Result<Action, Error> {
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::internal("namespaced resource has no namespace"))?;
    let name = obj.name_any();
    let external = external_name(&namespace, &name);

    let Some(current) = ctx.store.get(&namespace, &name).await? else {
        // Gone from the store: make sure nothing is left behind in Consul
        delete_external::<K>(ctx.acl.as_ref(), &external).await?;
        return Ok(Action::await_change());
    };

    if current.meta().deletion_timestamp.is_some() {
        return finalize(&current, ctx, &namespace, &name, &external).await;
    }

    if !has_finalizer(&current) {
        ctx.store
            .add_finalizer(&namespace, &name, K::FINALIZER)
            .await?;
        debug!("added finalizer, requeueing before sync");
        return Ok(Action::requeue(Duration::ZERO));
    }

    sync_live(&current, ctx, &namespace, &name, &external).await
}

/// Delete the Consul object, then release the finalizer
async fn finalize<K: AclResource>(
    obj: &K,
    ctx: &Context<K>,
    namespace: &str,
    name: &str,
    external: &str,
) -> Result<Action, Error> {
    if !has_finalizer(obj) {
        return Ok(Action::await_change());
    }

    match delete_external::<K>(ctx.acl.as_ref(), external).await {
        Ok(deleted) => {
            if deleted {
                publish(
                    obj,
                    ctx,
                    EventType::Normal,
                    reasons::DELETED,
                    actions::DELETE,
                    format!("Deleted Consul object {external}"),
                )
                .await;
            }
            ctx.store
                .remove_finalizer(namespace, name, K::FINALIZER)
                .await?;
            info!(consul_name = %external, "finalized");
            Ok(Action::await_change())
        }
        Err(e) => {
            warn!(consul_name = %external, error = %e, "failed to delete Consul object, keeping finalizer");
            publish(
                obj,
                ctx,
                EventType::Warning,
                reasons::DELETE_FAILED,
                actions::DELETE,
                e.to_string(),
            )
            .await;
            Err(e.into())
        }
    }
}

async fn sync_live<K: AclResource>(
    obj: &K,
    ctx: &Context<K>,
    namespace: &str,
    name: &str,
    external: &str,
) -> Result<Action, Error> {
    let acl = ctx.acl.as_ref();
    let generation = obj.meta().generation;
    let mut status = StatusWriter::new(obj.acl_status().cloned(), namespace, name);
    let stored_id = status.id();
    let known_id = Some(stored_id.as_str()).filter(|id| !id.is_empty());

    if let Err(e) = obj.validate() {
        return degrade(obj, ctx, &mut status, generation, reasons::INVALID_SPEC, e).await;
    }

    let desired = match obj.desired(acl, external).await {
        Ok(desired) => desired,
        Err(e) if e.is_retryable() => return Err(transient(obj, ctx, e).await),
        Err(e) => {
            return degrade(obj, ctx, &mut status, generation, reasons::INVALID_SPEC, e).await;
        }
    };

    let observed = match K::read_by_name(acl, external).await {
        Ok(observed) => observed,
        Err(e) => return Err(transient(obj, ctx, e.into()).await),
    };

    let health = evaluate::<K>(&desired, observed.as_ref(), known_id, false);
    if health == HealthStatus::Healthy {
        let was_healthy = status.health() == Some(HealthStatus::Healthy);
        status
            .write(
                ctx,
                AclStatus::with_health(HealthStatus::Healthy)
                    .id(stored_id.clone())
                    .observed_generation(generation),
            )
            .await?;
        if !was_healthy {
            publish(
                obj,
                ctx,
                EventType::Normal,
                reasons::IN_SYNC,
                actions::RECONCILE,
                format!("Consul object {external} matches spec"),
            )
            .await;
        }
        debug!(consul_name = %external, "in sync");
        return Ok(Action::requeue(ctx.config.sync_period()));
    }

    info!(consul_name = %external, %health, "drift detected, synchronizing");
    status
        .write(
            ctx,
            AclStatus::with_health(health)
                .id(stored_id.clone())
                .observed_generation(generation),
        )
        .await?;
    publish(
        obj,
        ctx,
        EventType::Normal,
        reasons::DRIFTED,
        actions::RECONCILE,
        format!("Consul object {external} is {health}"),
    )
    .await;

    match synchronize::<K>(acl, external, known_id, &desired).await {
        Ok(outcome) => {
            let health =
                evaluate::<K>(&desired, Some(&outcome.remote), Some(&outcome.id), false);
            if health != HealthStatus::Healthy {
                warn!(consul_name = %external, %health, "Consul accepted the write but still differs");
            }
            status
                .write(
                    ctx,
                    AclStatus::with_health(health)
                        .id(outcome.id.clone())
                        .observed_generation(generation),
                )
                .await?;
            let reason = match outcome.action {
                SyncAction::Created => reasons::CREATED,
                SyncAction::Updated => reasons::UPDATED,
                SyncAction::Adopted => reasons::ADOPTED,
            };
            publish(
                obj,
                ctx,
                EventType::Normal,
                reason,
                actions::SYNC,
                format!("Consul object {external} {} ({})", outcome.action, outcome.id),
            )
            .await;
            Ok(Action::requeue(ctx.config.sync_period()))
        }
        Err(e) if e.is_retryable() => Err(transient(obj, ctx, e.into()).await),
        Err(e) => {
            let health = evaluate::<K>(&desired, observed.as_ref(), known_id, true);
            let (reason, message) = if e.is_conflict() {
                (
                    reasons::NAME_CONFLICT,
                    format!("Consul name {external} is already in use: {e}"),
                )
            } else {
                (reasons::SYNC_FAILED, e.to_string())
            };
            status
                .write(
                    ctx,
                    AclStatus::with_health(health)
                        .id(stored_id)
                        .message(message.clone())
                        .observed_generation(generation),
                )
                .await?;
            warn!(consul_name = %external, error = %message, "Consul rejected sync");
            publish(obj, ctx, EventType::Warning, reason, actions::SYNC, message).await;
            Ok(Action::await_change())
        }
    }
}

/// Record a permanent failure and wait for the resource spec to change
async fn degrade<K: AclResource>(
    obj: &K,
    ctx: &Context<K>,
    status: &mut StatusWriter<'_>,
    generation: Option<i64>,
    reason: &str,
    error: Error,
) -> Result<Action, Error> {
    let message = error.to_string();
    warn!(error = %message, "resource degraded");
    let id = status.id();
    status
        .write(
            ctx,
            AclStatus::with_health(HealthStatus::Degraded)
                .id(id)
                .message(message.clone())
                .observed_generation(generation),
        )
        .await?;
    publish(obj, ctx, EventType::Warning, reason, actions::RECONCILE, message).await;
    Ok(Action::await_change())
}

/// Report a retryable failure; status keeps its last classification
async fn transient<K: AclResource>(obj: &K, ctx: &Context<K>, error: Error) -> Error {
    warn!(error = %error, "transient failure, will retry");
    publish(
        obj,
        ctx,
        EventType::Warning,
        reasons::SYNC_FAILED,
        actions::SYNC,
        error.to_string(),
    )
    .await;
    error
}

async fn publish<K: AclResource>(
    obj: &K,
    ctx: &Context<K>,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&obj.object_ref(&()), acl_event(type_, reason, action, note))
        .await;
}

/// Tracks the last status written in this pass so unchanged writes are skipped
struct StatusWriter<'a> {
    current: Option<AclStatus>,
    namespace: &'a str,
    name: &'a str,
}

impl<'a> StatusWriter<'a> {
    fn new(current: Option<AclStatus>, namespace: &'a str, name: &'a str) -> Self {
        Self {
            current,
            namespace,
            name,
        }
    }

    fn id(&self) -> String {
        self.current
            .as_ref()
            .map(|s| s.id.clone())
            .unwrap_or_default()
    }

    fn health(&self) -> Option<HealthStatus> {
        self.current.as_ref().and_then(|s| s.health)
    }

    async fn write<K: AclResource>(
        &mut self,
        ctx: &Context<K>,
        status: AclStatus,
    ) -> Result<(), Error> {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.same_state(&status))
        {
            debug!("status unchanged, skipping update");
            return Ok(());
        }

        let status = status.synced_now();
        ctx.store
            .patch_status(self.namespace, self.name, &status)
            .await
            .inspect_err(|e| error!(error = %e, "failed to persist status"))?;
        self.current = Some(status);
        Ok(())
    }
}
