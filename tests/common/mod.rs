//! Shared fixtures for the reconciliation scenario tests
//!
//! `FakeConsul` keeps ACL objects in memory and enforces the uniqueness
//! rules the real API enforces. `InMemoryStore` plays the Kubernetes API for
//! one resource kind, including finalizer-gated deletion.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType};
use kube::{Resource, ResourceExt};

use consul_acl_operator::config::OperatorConfig;
use consul_acl_operator::consul::{
    AclAuthMethod, AclBindingRule, AclClient, AclPolicy, AclRole, ConsulError, ConsulResult,
};
use consul_acl_operator::controller::{reconcile, Context, ObjectStore};
use consul_acl_operator::crd::AclStatus;
use consul_acl_operator::events::EventPublisher;
use consul_acl_operator::sync::AclResource;
use consul_acl_operator::Error;

// =============================================================================
// Fake Consul
// =============================================================================

#[derive(Default)]
struct ConsulState {
    roles: BTreeMap<String, AclRole>,
    policies: BTreeMap<String, AclPolicy>,
    auth_methods: BTreeMap<String, AclAuthMethod>,
    rules: BTreeMap<String, AclBindingRule>,
}

/// In-memory Consul ACL API
#[derive(Default)]
pub struct FakeConsul {
    state: Mutex<ConsulState>,
    next_id: AtomicU64,
    unreachable: AtomicBool,
    writes: AtomicU64,
}

impl FakeConsul {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ConsulState> {
        self.state.lock().expect("mutex should not be poisoned")
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn reachable(&self) -> ConsulResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ConsulError::Connectivity("connection refused".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> ConsulResult<()> {
        self.reachable()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Simulate Consul going down or coming back
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of mutating calls received so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn add_policy(&self, name: &str) -> String {
        let id = self.new_id("policy");
        self.state().policies.insert(
            name.to_string(),
            AclPolicy {
                id: id.clone(),
                name: name.to_string(),
                description: String::new(),
            },
        );
        id
    }

    pub fn roles(&self) -> Vec<AclRole> {
        self.state().roles.values().cloned().collect()
    }

    pub fn role_named(&self, name: &str) -> Option<AclRole> {
        self.state().roles.values().find(|r| r.name == name).cloned()
    }

    /// Change a role behind the operator's back
    pub fn edit_role(&self, id: &str, edit: impl FnOnce(&mut AclRole)) {
        if let Some(role) = self.state().roles.get_mut(id) {
            edit(role);
        }
    }

    /// Delete a role behind the operator's back
    pub fn remove_role(&self, id: &str) {
        self.state().roles.remove(id);
    }

    /// Create a role behind the operator's back
    pub fn insert_role(&self, name: &str, description: &str) -> String {
        let id = self.new_id("role");
        self.state().roles.insert(
            id.clone(),
            AclRole {
                id: id.clone(),
                name: name.to_string(),
                description: description.to_string(),
                policies: vec![],
            },
        );
        id
    }

    pub fn auth_method(&self, name: &str) -> Option<AclAuthMethod> {
        self.state().auth_methods.get(name).cloned()
    }

    pub fn rules(&self) -> Vec<AclBindingRule> {
        self.state().rules.values().cloned().collect()
    }
}

#[async_trait]
impl AclClient for FakeConsul {
    async fn role_read_by_name(&self, name: &str) -> ConsulResult<Option<AclRole>> {
        self.reachable()?;
        Ok(self.role_named(name))
    }

    async fn role_read(&self, id: &str) -> ConsulResult<Option<AclRole>> {
        self.reachable()?;
        Ok(self.state().roles.get(id).cloned())
    }

    async fn role_create(&self, role: &AclRole) -> ConsulResult<AclRole> {
        self.write()?;
        if self.role_named(&role.name).is_some() {
            return Err(ConsulError::Api {
                status: 400,
                message: format!("Invalid Role: A Role with Name {:?} already exists", role.name),
            });
        }
        let created = AclRole {
            id: self.new_id("role"),
            ..role.clone()
        };
        self.state()
            .roles
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn role_update(&self, id: &str, role: &AclRole) -> ConsulResult<AclRole> {
        self.write()?;
        let mut state = self.state();
        if !state.roles.contains_key(id) {
            return Err(ConsulError::Api {
                status: 400,
                message: format!("Invalid Role: cannot find role {id}"),
            });
        }
        let updated = AclRole {
            id: id.to_string(),
            ..role.clone()
        };
        state.roles.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn role_delete(&self, id: &str) -> ConsulResult<()> {
        self.write()?;
        self.state().roles.remove(id);
        Ok(())
    }

    async fn policy_read_by_name(&self, name: &str) -> ConsulResult<Option<AclPolicy>> {
        self.reachable()?;
        Ok(self.state().policies.get(name).cloned())
    }

    async fn auth_method_read(&self, name: &str) -> ConsulResult<Option<AclAuthMethod>> {
        self.reachable()?;
        Ok(self.auth_method(name))
    }

    async fn auth_method_create(&self, method: &AclAuthMethod) -> ConsulResult<AclAuthMethod> {
        self.write()?;
        let mut state = self.state();
        if state.auth_methods.contains_key(&method.name) {
            return Err(ConsulError::Api {
                status: 400,
                message: format!("Invalid Auth Method: {} already exists", method.name),
            });
        }
        state
            .auth_methods
            .insert(method.name.clone(), method.clone());
        Ok(method.clone())
    }

    async fn auth_method_update(&self, method: &AclAuthMethod) -> ConsulResult<AclAuthMethod> {
        self.write()?;
        self.state()
            .auth_methods
            .insert(method.name.clone(), method.clone());
        Ok(method.clone())
    }

    async fn auth_method_delete(&self, name: &str) -> ConsulResult<()> {
        self.write()?;
        let mut state = self.state();
        state.auth_methods.remove(name);
        // Consul drops the method's binding rules with it
        state.rules.retain(|_, r| r.auth_method != name);
        Ok(())
    }

    async fn binding_rule_list(&self) -> ConsulResult<Vec<AclBindingRule>> {
        self.reachable()?;
        Ok(self.rules())
    }

    async fn binding_rule_read(&self, id: &str) -> ConsulResult<Option<AclBindingRule>> {
        self.reachable()?;
        Ok(self.state().rules.get(id).cloned())
    }

    async fn binding_rule_create(&self, rule: &AclBindingRule) -> ConsulResult<AclBindingRule> {
        self.write()?;
        let mut state = self.state();
        if !state.auth_methods.contains_key(&rule.auth_method) {
            return Err(ConsulError::Api {
                status: 400,
                message: format!("Invalid Binding Rule: unknown auth method {:?}", rule.auth_method),
            });
        }
        let created = AclBindingRule {
            id: format!("rule-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            ..rule.clone()
        };
        state.rules.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn binding_rule_update(
        &self,
        id: &str,
        rule: &AclBindingRule,
    ) -> ConsulResult<AclBindingRule> {
        self.write()?;
        let updated = AclBindingRule {
            id: id.to_string(),
            ..rule.clone()
        };
        self.state().rules.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn binding_rule_delete(&self, id: &str) -> ConsulResult<()> {
        self.write()?;
        self.state().rules.remove(id);
        Ok(())
    }
}

// =============================================================================
// In-memory Kubernetes store
// =============================================================================

/// Plays the Kubernetes API for one resource kind
pub struct InMemoryStore<K> {
    objects: Mutex<HashMap<(String, String), K>>,
}

impl<K: AclResource> InMemoryStore<K> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
        })
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), K>> {
        self.objects.lock().expect("mutex should not be poisoned")
    }

    fn key(namespace: &str, name: &str) -> (String, String) {
        (namespace.to_string(), name.to_string())
    }

    /// Create the object, or replace its spec and bump the generation
    pub fn apply(&self, mut obj: K) {
        let key = Self::key(&obj.namespace().unwrap_or_default(), &obj.name_any());
        let mut objects = self.objects();
        match objects.get(&key) {
            Some(existing) => {
                let meta = existing.meta().clone();
                let generation = meta.generation.unwrap_or(1) + 1;
                let status = serde_json::to_value(existing)
                    .ok()
                    .and_then(|v| v.get("status").cloned());
                *obj.meta_mut() = meta;
                obj.meta_mut().generation = Some(generation);
                if let Some(status) = status {
                    obj = with_status_value(&obj, status);
                }
            }
            None => {
                obj.meta_mut().generation = Some(1);
            }
        }
        objects.insert(key, obj);
    }

    /// Request deletion; the object stays until its finalizers are gone
    pub fn delete(&self, namespace: &str, name: &str) {
        let key = Self::key(namespace, name);
        let mut objects = self.objects();
        let Some(obj) = objects.get_mut(&key) else {
            return;
        };
        if obj.finalizers().is_empty() {
            objects.remove(&key);
        } else {
            obj.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
    }

    /// Remove the object ignoring finalizers, as a forced delete would
    pub fn purge(&self, namespace: &str, name: &str) {
        self.objects().remove(&Self::key(namespace, name));
    }

    pub fn fetch(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects().get(&Self::key(namespace, name)).cloned()
    }

    pub fn status(&self, namespace: &str, name: &str) -> Option<AclStatus> {
        self.fetch(namespace, name)
            .and_then(|obj| obj.acl_status().cloned())
    }
}

fn with_status_value<K: AclResource>(obj: &K, status: serde_json::Value) -> K {
    let mut value = serde_json::to_value(obj).expect("resource serializes");
    value["status"] = status;
    serde_json::from_value(value).expect("resource deserializes")
}

#[async_trait]
impl<K: AclResource> ObjectStore<K> for InMemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        Ok(self.fetch(namespace, name))
    }

    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str) -> Result<(), Error> {
        if let Some(obj) = self.objects().get_mut(&Self::key(namespace, name)) {
            let finalizers = obj.meta_mut().finalizers.get_or_insert_with(Vec::new);
            if !finalizers.iter().any(|f| f == finalizer) {
                finalizers.push(finalizer.to_string());
            }
        }
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let key = Self::key(namespace, name);
        let mut objects = self.objects();
        let Some(obj) = objects.get_mut(&key) else {
            return Ok(());
        };
        if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
        if obj.meta().deletion_timestamp.is_some() && obj.finalizers().is_empty() {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AclStatus,
    ) -> Result<(), Error> {
        let key = Self::key(namespace, name);
        let mut objects = self.objects();
        if let Some(obj) = objects.get(&key) {
            let value = serde_json::to_value(status).expect("status serializes");
            let updated = with_status_value(obj, value);
            objects.insert(key, updated);
        }
        Ok(())
    }
}

// =============================================================================
// Event recording
// =============================================================================

/// Event publisher that remembers every `(type, reason)` it was given
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(EventType, String)>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("mutex should not be poisoned")
            .iter()
            .map(|(_, reason)| reason.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("mutex should not be poisoned")
            .iter()
            .filter(|(t, _)| *t == EventType::Warning)
            .map(|(_, reason)| reason.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(&self, _target: &ObjectReference, event: Event) {
        self.events
            .lock()
            .expect("mutex should not be poisoned")
            .push((event.type_, event.reason));
    }
}

// =============================================================================
// Harness
// =============================================================================

/// One controller's worth of wiring around a shared fake Consul
pub struct Harness<K: AclResource> {
    pub store: Arc<InMemoryStore<K>>,
    pub events: Arc<RecordingEvents>,
    pub ctx: Arc<Context<K>>,
    last_seen: Mutex<HashMap<(String, String), K>>,
}

impl<K: AclResource> Harness<K> {
    pub fn new(consul: Arc<FakeConsul>) -> Self {
        let store = InMemoryStore::<K>::new();
        let events = RecordingEvents::new();
        let ctx = Arc::new(Context::new(
            store.clone(),
            consul,
            events.clone(),
            Arc::new(OperatorConfig::default()),
        ));
        Self {
            store,
            events,
            ctx,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Run one reconciliation pass, as the controller would after a watch event
    ///
    /// Objects already gone from the store are reconciled from their last
    /// seen copy, like a controller acting on a delete event.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Action, Error> {
        let key = (namespace.to_string(), name.to_string());
        let obj = match self.store.fetch(namespace, name) {
            Some(obj) => {
                self.last_seen
                    .lock()
                    .expect("mutex should not be poisoned")
                    .insert(key, obj.clone());
                obj
            }
            None => self
                .last_seen
                .lock()
                .expect("mutex should not be poisoned")
                .get(&key)
                .cloned()
                .expect("object was reconciled before"),
        };
        reconcile(Arc::new(obj), self.ctx.clone()).await
    }

    /// Reconcile until the controller stops asking for an immediate requeue
    pub async fn settle(&self, namespace: &str, name: &str) -> Result<Action, Error> {
        for _ in 0..5 {
            let action = self.reconcile(namespace, name).await?;
            if action != Action::requeue(std::time::Duration::ZERO) {
                return Ok(action);
            }
        }
        panic!("{namespace}/{name} did not settle");
    }
}

/// Give an object a namespace before it is applied
pub fn in_namespace<K: Resource>(mut obj: K, namespace: &str) -> K {
    obj.meta_mut().namespace = Some(namespace.to_string());
    obj
}
