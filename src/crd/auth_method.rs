//! AclAuthMethod CRD

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{parse_go_duration, AclStatus};

/// Desired state of a Consul ACL auth method.
///
/// Example:
/// ```yaml
/// apiVersion: consul.cloudopskit.org/v1alpha1
/// kind: AclAuthMethod
/// metadata:
///   name: k8s
///   namespace: team-a
/// spec:
///   type: kubernetes
///   maxTokenTTL: 1h
///   tokenLocality: local
///   config:
///     Host: https://kubernetes.default.svc
///     CACert: "-----BEGIN CERTIFICATE-----..."
///     ServiceAccountJWT: "eyJhbGciOi..."
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "consul.cloudopskit.org",
    version = "v1alpha1",
    kind = "AclAuthMethod",
    shortname = "aclam",
    namespaced,
    status = "AclStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AclAuthMethodSpec {
    /// Auth method type (kubernetes, jwt, oidc)
    #[serde(rename = "type")]
    pub type_: String,

    /// Name shown in the Consul UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Maximum lifetime of tokens created by this method (Go duration, e.g. "1h")
    #[serde(
        rename = "maxTokenTTL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_token_ttl: Option<String>,

    /// Where tokens are created: `local` or `global`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_locality: Option<String>,

    /// Type-specific configuration passed to Consul as-is
    #[serde(default)]
    #[schemars(schema_with = "free_form_object")]
    pub config: BTreeMap<String, serde_json::Value>,
}

/// Object schema that keeps arbitrary nested keys
fn free_form_object(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

impl AclAuthMethodSpec {
    /// Check type, TTL format and token locality
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.type_.trim().is_empty() {
            return Err(crate::Error::validation("type must not be empty"));
        }

        if let Some(ttl) = &self.max_token_ttl {
            if parse_go_duration(ttl).is_none() {
                return Err(crate::Error::validation(format!(
                    "maxTokenTTL '{ttl}' is not a valid duration"
                )));
            }
        }

        match self.token_locality.as_deref() {
            None | Some("local") | Some("global") => {}
            Some(other) => {
                return Err(crate::Error::validation(format!(
                    "tokenLocality must be 'local' or 'global', got '{other}'"
                )));
            }
        }

        Ok(())
    }
}
