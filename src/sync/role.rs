use async_trait::async_trait;
use tracing::debug;

use super::{managed_name, AclResource};
use crate::consul::{AclClient, AclRole as ConsulRole, ConsulResult};
use crate::crd::{validate_external_name, AclRole, AclStatus};
use crate::Error;

#[async_trait]
impl AclResource for AclRole {
    type Remote = ConsulRole;

    const FINALIZER: &'static str = "aclrole.consul.cloudopskit.finalizer";

    fn acl_status(&self) -> Option<&AclStatus> {
        self.status.as_ref()
    }

    fn validate(&self) -> Result<(), Error> {
        self.spec.validate()?;
        validate_external_name(&managed_name(self))
    }

    async fn desired(&self, client: &dyn AclClient, external_name: &str) -> Result<ConsulRole, Error> {
        let mut policies = Vec::with_capacity(self.spec.policies.len());
        for name in &self.spec.policies {
            match client.policy_read_by_name(name).await? {
                Some(policy) => policies.push(policy.link()),
                None => {
                    return Err(Error::validation(format!("policy '{name}' does not exist")));
                }
            }
        }
        debug!(role = %external_name, policies = policies.len(), "resolved role policies");

        Ok(ConsulRole {
            id: String::new(),
            name: external_name.to_string(),
            description: self.spec.description.clone(),
            policies,
        })
    }

    async fn read_by_name(
        client: &dyn AclClient,
        external_name: &str,
    ) -> ConsulResult<Option<ConsulRole>> {
        client.role_read_by_name(external_name).await
    }

    async fn read_by_id(client: &dyn AclClient, id: &str) -> ConsulResult<Option<ConsulRole>> {
        client.role_read(id).await
    }

    async fn create(client: &dyn AclClient, desired: &ConsulRole) -> ConsulResult<ConsulRole> {
        client.role_create(desired).await
    }

    async fn update(
        client: &dyn AclClient,
        id: &str,
        desired: &ConsulRole,
    ) -> ConsulResult<ConsulRole> {
        client.role_update(id, desired).await
    }

    async fn delete(client: &dyn AclClient, observed: &ConsulRole) -> ConsulResult<()> {
        client.role_delete(&observed.id).await
    }

    fn remote_id(remote: &ConsulRole) -> String {
        remote.id.clone()
    }

    fn converged(desired: &ConsulRole, observed: &ConsulRole) -> bool {
        desired.name == observed.name
            && desired.description == observed.description
            && policy_multiset(desired) == policy_multiset(observed)
    }
}

/// Policy identifiers sorted, duplicates kept
fn policy_multiset(role: &ConsulRole) -> Vec<&str> {
    let mut keys: Vec<&str> = role.policies.iter().map(|p| p.key()).collect();
    keys.sort_unstable();
    keys
}
