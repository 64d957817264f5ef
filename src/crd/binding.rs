//! AclBinding CRD
//!
//! An AclBinding manages one Consul binding rule on an auth method owned by
//! an AclAuthMethod in the same namespace.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::AclStatus;

/// Desired state of a Consul ACL binding rule.
///
/// Example:
/// ```yaml
/// apiVersion: consul.cloudopskit.org/v1alpha1
/// kind: AclBinding
/// metadata:
///   name: web-services
///   namespace: team-a
/// spec:
///   authMethod: k8s
///   bindType: service
///   bindName: "${serviceaccount.name}"
///   selector: serviceaccount.namespace==team-a
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "consul.cloudopskit.org",
    version = "v1alpha1",
    kind = "AclBinding",
    shortname = "aclbinding",
    namespaced,
    status = "AclStatus",
    printcolumn = r#"{"name":"AuthMethod","type":"string","jsonPath":".spec.authMethod"}"#,
    printcolumn = r#"{"name":"BindType","type":"string","jsonPath":".spec.bindType"}"#,
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AclBindingSpec {
    /// Name of an AclAuthMethod in the same namespace
    pub auth_method: String,

    /// What the rule binds the login to
    pub bind_type: BindType,

    /// Name of the bound object; may use `${...}` interpolation
    pub bind_name: String,

    /// Expression matched against the identity's claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Free-form description appended to the managed name in Consul
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Binding rule target type
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BindType {
    /// Service identity
    #[default]
    Service,
    /// Node identity
    Node,
    /// Existing ACL role
    Role,
    /// Existing ACL policy
    Policy,
}

impl std::fmt::Display for BindType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Node => write!(f, "node"),
            Self::Role => write!(f, "role"),
            Self::Policy => write!(f, "policy"),
        }
    }
}

impl AclBindingSpec {
    /// Reject bindings Consul would refuse
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.auth_method.trim().is_empty() {
            return Err(crate::Error::validation("authMethod must not be empty"));
        }
        if self.bind_name.trim().is_empty() {
            return Err(crate::Error::validation("bindName must not be empty"));
        }
        Ok(())
    }
}
