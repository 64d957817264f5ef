//! Kubernetes Events for ACL resources
//!
//! Events show up in `kubectl describe` next to the resource. Publishing is
//! best effort: a failure is logged and reconciliation carries on.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Sink for Events about ACL resources
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record `event` against the resource behind `target`
    async fn publish(&self, target: &ObjectReference, event: Event);
}

/// Build an event with the given type, reason and note
pub fn acl_event(type_: EventType, reason: &str, action: &str, note: impl Into<String>) -> Event {
    Event {
        type_,
        reason: reason.to_string(),
        note: Some(note.into()),
        action: action.to_string(),
        secondary: None,
    }
}

/// Publisher writing `events.k8s.io` Events through the API server
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Report as `controller_name`; the pod name, when set, identifies the replica
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, target: &ObjectReference, event: Event) {
        if let Err(e) = self.recorder.publish(&event, target).await {
            warn!(
                reason = %event.reason,
                object = target.name.as_deref().unwrap_or_default(),
                error = %e,
                "failed to publish event"
            );
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _target: &ObjectReference, _event: Event) {}
}

/// Event reasons, shown under REASON in `kubectl get events`
pub mod reasons {
    /// Consul object created
    pub const CREATED: &str = "Created";
    /// Consul object updated to match the resource spec
    pub const UPDATED: &str = "Updated";
    /// Existing Consul object with the managed name taken over
    pub const ADOPTED: &str = "Adopted";
    /// Consul object matches the resource spec
    pub const IN_SYNC: &str = "InSync";
    /// Consul object is missing or differs from the resource spec
    pub const DRIFTED: &str = "Drifted";
    /// Sync failed; it will be retried or needs a spec fix
    pub const SYNC_FAILED: &str = "SyncFailed";
    /// The managed Consul name is taken by an object Consul will not let us adopt
    pub const NAME_CONFLICT: &str = "NameConflict";
    /// Consul object could not be removed; the finalizer is kept
    pub const DELETE_FAILED: &str = "DeleteFailed";
    /// Consul object removed
    pub const DELETED: &str = "Deleted";
    /// Spec rejected before contacting Consul
    pub const INVALID_SPEC: &str = "InvalidSpec";
}

/// Event actions, shown under ACTION in `kubectl get events`
pub mod actions {
    /// Comparing Consul with the resource spec
    pub const RECONCILE: &str = "Reconcile";
    /// Writing to Consul
    pub const SYNC: &str = "Sync";
    /// Removing the Consul object
    pub const DELETE: &str = "Delete";
}
