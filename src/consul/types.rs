//! Wire types for the Consul ACL HTTP API
//!
//! Field names follow Consul's PascalCase JSON. Unknown fields returned by
//! newer Consul versions are ignored on deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reference from a role to a policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyLink {
    /// Policy ID
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Policy name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl PolicyLink {
    /// Identifier used for comparison: the ID when known, else the name
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

/// ACL policy as returned by `/v1/acl/policy`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AclPolicy {
    /// Policy ID
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Policy name
    #[serde(default)]
    pub name: String,
    /// Policy description
    #[serde(default)]
    pub description: String,
}

impl AclPolicy {
    /// Link to this policy for use in a role
    pub fn link(&self) -> PolicyLink {
        PolicyLink {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// ACL role
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AclRole {
    /// Role ID, empty before creation
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Role name
    pub name: String,
    /// Role description
    #[serde(default)]
    pub description: String,
    /// Linked policies
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<PolicyLink>,
}

/// ACL auth method. Auth methods are keyed by name.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AclAuthMethod {
    /// Method name
    pub name: String,
    /// Method type (kubernetes, jwt, oidc, ...)
    #[serde(rename = "Type")]
    pub type_: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Maximum token TTL as a Go duration string
    #[serde(rename = "MaxTokenTTL", default, skip_serializing_if = "Option::is_none")]
    pub max_token_ttl: Option<String>,
    /// `local` or `global`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_locality: Option<String>,
    /// Type-specific configuration
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: BTreeMap<String, serde_json::Value>,
}

/// ACL binding rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AclBindingRule {
    /// Rule ID, empty before creation
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Description; carries the operator-managed external name
    #[serde(default)]
    pub description: String,
    /// Auth method the rule is attached to
    pub auth_method: String,
    /// Selector expression over the identity's claims
    #[serde(default)]
    pub selector: String,
    /// `service`, `node`, `role` or `policy`
    pub bind_type: String,
    /// Name to bind
    pub bind_name: String,
}

/// Consul sends `null` for empty collections
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
