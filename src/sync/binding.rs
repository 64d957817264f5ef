//! Binding rules have no name in Consul. The managed name is stored at the
//! start of the rule's description and read back from there.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

use super::AclResource;
use crate::consul::{AclBindingRule, AclClient, ConsulResult};
use crate::crd::{AclBinding, AclStatus};
use crate::Error;

/// Consul description for a binding rule: the managed name, then the user's text
pub fn binding_description(external_name: &str, description: Option<&str>) -> String {
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(text) => format!("{external_name}: {text}"),
        None => external_name.to_string(),
    }
}

fn is_managed_by(rule: &AclBindingRule, external_name: &str) -> bool {
    match rule.description.strip_prefix(external_name) {
        Some(rest) => rest.is_empty() || rest.starts_with(": "),
        None => false,
    }
}

#[async_trait]
impl AclResource for AclBinding {
    type Remote = AclBindingRule;

    const FINALIZER: &'static str = "aclbinding.consul.cloudopskit.finalizer";

    fn acl_status(&self) -> Option<&AclStatus> {
        self.status.as_ref()
    }

    fn validate(&self) -> Result<(), Error> {
        self.spec.validate()
    }

    async fn desired(
        &self,
        client: &dyn AclClient,
        external_name: &str,
    ) -> Result<AclBindingRule, Error> {
        let namespace = self.namespace().unwrap_or_default();
        let auth_method = crate::crd::external_name(&namespace, &self.spec.auth_method);

        if client.auth_method_read(&auth_method).await?.is_none() {
            return Err(Error::dependency(format!(
                "auth method '{auth_method}' does not exist"
            )));
        }

        Ok(AclBindingRule {
            id: String::new(),
            description: binding_description(external_name, self.spec.description.as_deref()),
            auth_method,
            selector: self.spec.selector.clone().unwrap_or_default(),
            bind_type: self.spec.bind_type.to_string(),
            bind_name: self.spec.bind_name.clone(),
        })
    }

    async fn read_by_name(
        client: &dyn AclClient,
        external_name: &str,
    ) -> ConsulResult<Option<AclBindingRule>> {
        let rules = client.binding_rule_list().await?;
        debug!(binding = %external_name, rules = rules.len(), "scanning binding rules");
        Ok(rules.into_iter().find(|r| is_managed_by(r, external_name)))
    }

    async fn read_by_id(client: &dyn AclClient, id: &str) -> ConsulResult<Option<AclBindingRule>> {
        client.binding_rule_read(id).await
    }

    async fn create(
        client: &dyn AclClient,
        desired: &AclBindingRule,
    ) -> ConsulResult<AclBindingRule> {
        client.binding_rule_create(desired).await
    }

    async fn update(
        client: &dyn AclClient,
        id: &str,
        desired: &AclBindingRule,
    ) -> ConsulResult<AclBindingRule> {
        client.binding_rule_update(id, desired).await
    }

    async fn delete(client: &dyn AclClient, observed: &AclBindingRule) -> ConsulResult<()> {
        client.binding_rule_delete(&observed.id).await
    }

    fn remote_id(remote: &AclBindingRule) -> String {
        remote.id.clone()
    }

    fn converged(desired: &AclBindingRule, observed: &AclBindingRule) -> bool {
        desired.description == observed.description
            && desired.auth_method == observed.auth_method
            && desired.selector == observed.selector
            && desired.bind_type == observed.bind_type
            && desired.bind_name == observed.bind_name
    }
}
