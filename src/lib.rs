//! Consul ACL operator - keeps Consul ACL roles, auth methods and binding
//! rules in line with Kubernetes custom resources
//!
//! Each `AclRole`, `AclAuthMethod` and `AclBinding` resource owns exactly one
//! Consul object named `<namespace>_<name>`. Controllers converge Consul
//! toward the resource spec, report health in status, and remove the Consul
//! object before the resource is allowed to go away.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions and the shared status
//! - [`consul`] - Consul ACL HTTP API client
//! - [`sync`] - Per-kind desired state, convergence and health evaluation
//! - [`controller`] - Kubernetes reconciliation loop
//! - [`config`] - Operator configuration
//! - [`events`] - Kubernetes Event publishing
//! - [`leader_election`] - Lease-based leader election for multiple replicas
//! - [`health`] - Liveness and readiness probe endpoints
//! - [`telemetry`] - Logging setup
//! - [`retry`] - Backoff helpers
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod consul;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod health;
pub mod leader_election;
pub mod retry;
pub mod sync;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of the ACL custom resources
pub const API_GROUP: &str = "consul.cloudopskit.org";

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "consul-acl-operator";

/// Controller name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "consul-acl-operator";
