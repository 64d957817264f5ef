//! Controllers for the ACL custom resources
//!
//! One generic reconciler drives all three kinds through [`AclResource`].
//! Deletion is guarded by a finalizer that is only released once Consul no
//! longer holds the object.
//!
//! [`AclResource`]: crate::sync::AclResource

mod context;
mod reconcile;
mod runner;
mod store;

pub use context::{Context, ContextBuilder};
pub use reconcile::{error_policy, has_finalizer, object_key, reconcile};
pub use runner::{build_binding_controller, build_controller, build_controllers, ControllerFuture};
pub use store::{status_patch, KubeStore, ObjectStore};
