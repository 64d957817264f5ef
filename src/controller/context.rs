use std::sync::Arc;

use dashmap::DashMap;
use kube::Client;

use super::store::{KubeStore, ObjectStore};
use crate::config::OperatorConfig;
use crate::consul::AclClient;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::sync::AclResource;
use crate::CONTROLLER_NAME;

/// Shared state for the controller of one resource kind
pub struct Context<K: AclResource> {
    /// Resource reads and writes (trait object for testability)
    pub store: Arc<dyn ObjectStore<K>>,
    /// Consul ACL API
    pub acl: Arc<dyn AclClient>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Operator configuration
    pub config: Arc<OperatorConfig>,
    /// Consecutive failures per `namespace/name`, cleared on success
    failures: DashMap<String, u32>,
}

impl<K: AclResource> Context<K> {
    /// Create a builder wiring the Kubernetes-backed store and events
    pub fn builder(
        client: Client,
        acl: Arc<dyn AclClient>,
        config: Arc<OperatorConfig>,
    ) -> ContextBuilder<K> {
        ContextBuilder {
            client,
            acl,
            config,
            store: None,
            events: None,
        }
    }

    /// Create a context from explicit parts
    pub fn new(
        store: Arc<dyn ObjectStore<K>>,
        acl: Arc<dyn AclClient>,
        events: Arc<dyn EventPublisher>,
        config: Arc<OperatorConfig>,
    ) -> Self {
        Self {
            store,
            acl,
            events,
            config,
            failures: DashMap::new(),
        }
    }

    /// Count another failure for `key`, returning the new count
    pub fn record_failure(&self, key: &str) -> u32 {
        let mut count = self.failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Forget failures for `key` after a successful pass
    pub fn reset_failures(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Current consecutive failure count for `key`
    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.get(key).map(|c| *c).unwrap_or(0)
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder<K: AclResource> {
    client: Client,
    acl: Arc<dyn AclClient>,
    config: Arc<OperatorConfig>,
    store: Option<Arc<dyn ObjectStore<K>>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl<K: AclResource> ContextBuilder<K> {
    /// Override the object store
    pub fn store(mut self, store: Arc<dyn ObjectStore<K>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the context
    pub fn build(self) -> Context<K> {
        let store: Arc<dyn ObjectStore<K>> = match self.store {
            Some(store) => store,
            None => Arc::new(KubeStore::<K>::new(self.client.clone())),
        };
        let events: Arc<dyn EventPublisher> = match self.events {
            Some(events) => events,
            None => Arc::new(KubeEventPublisher::new(self.client, CONTROLLER_NAME)),
        };
        Context::new(store, self.acl, events, self.config)
    }
}
