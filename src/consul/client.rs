//! HTTP implementation of [`AclClient`] against Consul's `/v1/acl` API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use super::{
    AclAuthMethod, AclBindingRule, AclClient, AclPolicy, AclRole, ConsulError, ConsulResult,
};
use crate::config::ConsulConfig;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Consul HTTP API client
#[derive(Clone, Debug)]
pub struct ConsulClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    datacenter: Option<String>,
    namespace: Option<String>,
}

impl ConsulClient {
    /// Build a client from the `consul` configuration section
    pub fn new(config: &ConsulConfig) -> ConsulResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .user_agent(concat!("consul-acl-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConsulError::Connectivity(format!("failed to build HTTP client: {e}")))?;

        let base_url = Url::parse(config.address.trim())
            .map_err(|e| ConsulError::Connectivity(format!("invalid consul address: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ConsulError::Connectivity(format!(
                "invalid consul address: {base_url}"
            )));
        }

        Ok(Self {
            http,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            datacenter: config.datacenter.clone().filter(|d| !d.is_empty()),
            namespace: config.namespace.clone().filter(|n| !n.is_empty()),
        })
    }

    /// Build a request for `/v1/acl/<segments>`
    ///
    /// Each segment is percent-encoded, so names cannot add path segments or
    /// a query string of their own.
    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["v1", "acl"]).extend(segments);
        }
        trace!(%method, %url, "consul request");

        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        if let Some(dc) = &self.datacenter {
            req = req.query(&[("dc", dc)]);
        }
        if let Some(ns) = &self.namespace {
            req = req.query(&[("ns", ns)]);
        }
        req
    }

    async fn get<T: DeserializeOwned>(&self, path: &[&str]) -> ConsulResult<Option<T>> {
        let resp = self.request(Method::GET, path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp).await?;
        Ok(Some(resp.json().await?))
    }

    async fn put<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &[&str],
        body: &B,
    ) -> ConsulResult<T> {
        let resp = self.request(Method::PUT, path).json(body).send().await?;
        let resp = check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn delete(&self, path: &[&str]) -> ConsulResult<()> {
        let resp = self.request(Method::DELETE, path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(path = %path.join("/"), "consul object already absent");
            return Ok(());
        }
        check(resp).await?;
        Ok(())
    }
}

/// Map non-success responses to [`ConsulError::Api`]
async fn check(resp: Response) -> ConsulResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ConsulError::Api {
        status: status.as_u16(),
        message: body.trim().to_string(),
    })
}

/// Consul returns 403 "ACL not found" for some lookups of missing IDs
fn is_missing(err: &ConsulError) -> bool {
    matches!(err, ConsulError::Api { status: 403, message } if message.contains("ACL not found"))
}

fn absent_on_missing<T>(result: ConsulResult<Option<T>>) -> ConsulResult<Option<T>> {
    match result {
        Err(e) if is_missing(&e) => Ok(None),
        other => other,
    }
}

#[async_trait]
impl AclClient for ConsulClient {
    async fn role_read_by_name(&self, name: &str) -> ConsulResult<Option<AclRole>> {
        absent_on_missing(self.get(&["role", "name", name]).await)
    }

    async fn role_read(&self, id: &str) -> ConsulResult<Option<AclRole>> {
        absent_on_missing(self.get(&["role", id]).await)
    }

    async fn role_create(&self, role: &AclRole) -> ConsulResult<AclRole> {
        self.put(&["role"], role).await
    }

    async fn role_update(&self, id: &str, role: &AclRole) -> ConsulResult<AclRole> {
        let body = AclRole {
            id: id.to_string(),
            ..role.clone()
        };
        self.put(&["role", id], &body).await
    }

    async fn role_delete(&self, id: &str) -> ConsulResult<()> {
        self.delete(&["role", id]).await
    }

    async fn policy_read_by_name(&self, name: &str) -> ConsulResult<Option<AclPolicy>> {
        absent_on_missing(self.get(&["policy", "name", name]).await)
    }

    async fn auth_method_read(&self, name: &str) -> ConsulResult<Option<AclAuthMethod>> {
        absent_on_missing(self.get(&["auth-method", name]).await)
    }

    async fn auth_method_create(&self, method: &AclAuthMethod) -> ConsulResult<AclAuthMethod> {
        self.put(&["auth-method"], method).await
    }

    async fn auth_method_update(&self, method: &AclAuthMethod) -> ConsulResult<AclAuthMethod> {
        self.put(&["auth-method", method.name.as_str()], method).await
    }

    async fn auth_method_delete(&self, name: &str) -> ConsulResult<()> {
        self.delete(&["auth-method", name]).await
    }

    async fn binding_rule_list(&self) -> ConsulResult<Vec<AclBindingRule>> {
        let resp = self.request(Method::GET, &["binding-rules"]).send().await?;
        // 404 means there is nothing to list
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let resp = check(resp).await?;
        let rules: Option<Vec<AclBindingRule>> = resp.json().await?;
        Ok(rules.unwrap_or_default())
    }

    async fn binding_rule_read(&self, id: &str) -> ConsulResult<Option<AclBindingRule>> {
        absent_on_missing(self.get(&["binding-rule", id]).await)
    }

    async fn binding_rule_create(&self, rule: &AclBindingRule) -> ConsulResult<AclBindingRule> {
        self.put(&["binding-rule"], rule).await
    }

    async fn binding_rule_update(
        &self,
        id: &str,
        rule: &AclBindingRule,
    ) -> ConsulResult<AclBindingRule> {
        let body = AclBindingRule {
            id: id.to_string(),
            ..rule.clone()
        };
        self.put(&["binding-rule", id], &body).await
    }

    async fn binding_rule_delete(&self, id: &str) -> ConsulResult<()> {
        self.delete(&["binding-rule", id]).await
    }
}
