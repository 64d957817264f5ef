//! Consul ACL API access
//!
//! The [`AclClient`] trait is the only seam between reconciliation and
//! Consul. [`ConsulClient`] implements it over the HTTP API; tests use the
//! generated `MockAclClient` or an in-memory fake.

mod client;
mod error;
mod types;

pub use client::ConsulClient;
pub use error::ConsulError;
pub use types::{AclAuthMethod, AclBindingRule, AclPolicy, AclRole, PolicyLink};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Result type for Consul calls
pub type ConsulResult<T> = std::result::Result<T, ConsulError>;

/// Operations on Consul ACL objects
///
/// Reads return `Ok(None)` when the object does not exist. Deletes succeed
/// when the object is already gone.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AclClient: Send + Sync {
    /// Look up a role by its unique name
    async fn role_read_by_name(&self, name: &str) -> ConsulResult<Option<AclRole>>;

    /// Look up a role by ID
    async fn role_read(&self, id: &str) -> ConsulResult<Option<AclRole>>;

    /// Create a role, returning it with its assigned ID
    async fn role_create(&self, role: &AclRole) -> ConsulResult<AclRole>;

    /// Replace the role with the given ID
    async fn role_update(&self, id: &str, role: &AclRole) -> ConsulResult<AclRole>;

    /// Delete a role by ID
    async fn role_delete(&self, id: &str) -> ConsulResult<()>;

    /// Look up a policy by name
    async fn policy_read_by_name(&self, name: &str) -> ConsulResult<Option<AclPolicy>>;

    /// Look up an auth method by name
    async fn auth_method_read(&self, name: &str) -> ConsulResult<Option<AclAuthMethod>>;

    /// Create an auth method
    async fn auth_method_create(&self, method: &AclAuthMethod) -> ConsulResult<AclAuthMethod>;

    /// Replace an auth method; the name in `method` selects the target
    async fn auth_method_update(&self, method: &AclAuthMethod) -> ConsulResult<AclAuthMethod>;

    /// Delete an auth method by name
    async fn auth_method_delete(&self, name: &str) -> ConsulResult<()>;

    /// List binding rules of every auth method
    async fn binding_rule_list(&self) -> ConsulResult<Vec<AclBindingRule>>;

    /// Look up a binding rule by ID
    async fn binding_rule_read(&self, id: &str) -> ConsulResult<Option<AclBindingRule>>;

    /// Create a binding rule, returning it with its assigned ID
    async fn binding_rule_create(&self, rule: &AclBindingRule) -> ConsulResult<AclBindingRule>;

    /// Replace the binding rule with the given ID
    async fn binding_rule_update(
        &self,
        id: &str,
        rule: &AclBindingRule,
    ) -> ConsulResult<AclBindingRule>;

    /// Delete a binding rule by ID
    async fn binding_rule_delete(&self, id: &str) -> ConsulResult<()>;
}
