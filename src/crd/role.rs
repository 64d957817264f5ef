//! AclRole CRD
//!
//! An AclRole manages one Consul ACL role named `<namespace>_<name>` whose
//! policies are resolved by name at sync time.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::AclStatus;

/// Desired state of a Consul ACL role.
///
/// Example:
/// ```yaml
/// apiVersion: consul.cloudopskit.org/v1alpha1
/// kind: AclRole
/// metadata:
///   name: web
///   namespace: team-a
/// spec:
///   description: web tier read access
///   policies:
///     - web-read
///     - kv-read
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "consul.cloudopskit.org",
    version = "v1alpha1",
    kind = "AclRole",
    shortname = "aclrole",
    namespaced,
    status = "AclStatus",
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.id"}"#,
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AclRoleSpec {
    /// Role description
    #[serde(default)]
    pub description: String,

    /// Names of Consul policies attached to the role
    #[serde(default)]
    pub policies: Vec<String>,
}

/// Longest policy name Consul accepts
const MAX_POLICY_NAME_LEN: usize = 128;

impl AclRoleSpec {
    /// Check that every policy name is one Consul could have issued
    ///
    /// Consul policy names are 1-128 ASCII letters, digits, `-` or `_`.
    pub fn validate(&self) -> Result<(), crate::Error> {
        for (pos, policy) in self.policies.iter().enumerate() {
            if policy.trim().is_empty() {
                return Err(crate::Error::validation(format!(
                    "policies[{pos}] must not be empty"
                )));
            }
            if policy.len() > MAX_POLICY_NAME_LEN {
                return Err(crate::Error::validation(format!(
                    "policies[{pos}] is longer than {MAX_POLICY_NAME_LEN} characters"
                )));
            }
            if let Some(c) = policy
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
            {
                return Err(crate::Error::validation(format!(
                    "policies[{pos}] '{policy}' contains invalid character '{c}'"
                )));
            }
        }
        Ok(())
    }
}
