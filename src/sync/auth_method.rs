use async_trait::async_trait;

use super::{managed_name, AclResource};
use crate::consul::{AclAuthMethod as ConsulAuthMethod, AclClient, ConsulResult};
use crate::crd::{parse_go_duration, validate_external_name, AclAuthMethod, AclStatus};
use crate::Error;

#[async_trait]
impl AclResource for AclAuthMethod {
    type Remote = ConsulAuthMethod;

    const FINALIZER: &'static str = "aclauthmethod.consul.cloudopskit.finalizer";

    fn acl_status(&self) -> Option<&AclStatus> {
        self.status.as_ref()
    }

    fn validate(&self) -> Result<(), Error> {
        self.spec.validate()?;
        validate_external_name(&managed_name(self))
    }

    async fn desired(
        &self,
        _client: &dyn AclClient,
        external_name: &str,
    ) -> Result<ConsulAuthMethod, Error> {
        Ok(ConsulAuthMethod {
            name: external_name.to_string(),
            type_: self.spec.type_.clone(),
            display_name: self.spec.display_name.clone(),
            description: self.spec.description.clone(),
            max_token_ttl: self.spec.max_token_ttl.clone(),
            token_locality: self.spec.token_locality.clone(),
            config: self.spec.config.clone(),
        })
    }

    async fn read_by_name(
        client: &dyn AclClient,
        external_name: &str,
    ) -> ConsulResult<Option<ConsulAuthMethod>> {
        client.auth_method_read(external_name).await
    }

    // Auth methods are keyed by name, so the identifier is the name
    async fn read_by_id(client: &dyn AclClient, id: &str) -> ConsulResult<Option<ConsulAuthMethod>> {
        client.auth_method_read(id).await
    }

    async fn create(
        client: &dyn AclClient,
        desired: &ConsulAuthMethod,
    ) -> ConsulResult<ConsulAuthMethod> {
        client.auth_method_create(desired).await
    }

    async fn update(
        client: &dyn AclClient,
        id: &str,
        desired: &ConsulAuthMethod,
    ) -> ConsulResult<ConsulAuthMethod> {
        let body = ConsulAuthMethod {
            name: id.to_string(),
            ..desired.clone()
        };
        client.auth_method_update(&body).await
    }

    async fn delete(client: &dyn AclClient, observed: &ConsulAuthMethod) -> ConsulResult<()> {
        client.auth_method_delete(&observed.name).await
    }

    fn remote_id(remote: &ConsulAuthMethod) -> String {
        remote.name.clone()
    }

    fn converged(desired: &ConsulAuthMethod, observed: &ConsulAuthMethod) -> bool {
        desired.name == observed.name
            && desired.type_ == observed.type_
            && optional_matches(&desired.display_name, &observed.display_name)
            && optional_matches(&desired.description, &observed.description)
            && optional_matches(&desired.token_locality, &observed.token_locality)
            && ttl_matches(&desired.max_token_ttl, &observed.max_token_ttl)
            && desired
                .config
                .iter()
                .all(|(key, value)| observed.config.get(key) == Some(value))
    }
}

/// Unset desired fields are not compared
fn optional_matches(desired: &Option<String>, observed: &Option<String>) -> bool {
    match desired {
        Some(want) => observed.as_deref() == Some(want.as_str()),
        None => true,
    }
}

fn ttl_matches(desired: &Option<String>, observed: &Option<String>) -> bool {
    match desired {
        Some(want) => {
            let want = parse_go_duration(want);
            let got = observed.as_deref().and_then(parse_go_duration);
            want.is_some() && want == got
        }
        None => true,
    }
}
