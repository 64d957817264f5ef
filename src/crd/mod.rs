//! Custom Resource Definitions for the Consul ACL operator
//!
//! All kinds live in the `consul.cloudopskit.org/v1alpha1` group, are
//! namespaced, and share [`AclStatus`].

mod auth_method;
mod binding;
mod role;
mod types;

pub use auth_method::{AclAuthMethod, AclAuthMethodSpec};
pub use binding::{AclBinding, AclBindingSpec, BindType};
pub use role::{AclRole, AclRoleSpec};
pub use types::{
    external_name, parse_go_duration, validate_external_name, AclStatus, HealthStatus,
    MAX_EXTERNAL_NAME_LEN,
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// CRDs installed by the operator at startup
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![AclRole::crd(), AclAuthMethod::crd(), AclBinding::crd()]
}

/// Render all CRDs as a multi-document YAML stream
pub fn crds_yaml() -> Result<String, crate::Error> {
    let mut out = String::new();
    for crd in all_crds() {
        let doc = serde_yaml::to_string(&crd)
            .map_err(|e| crate::Error::serialization(format!("failed to render CRD: {e}")))?;
        out.push_str("---\n");
        out.push_str(&doc);
    }
    Ok(out)
}
