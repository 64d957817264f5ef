//! Convergence of Consul ACL objects toward resource specs
//!
//! Each CRD implements [`AclResource`], which tells the generic code how to
//! build the desired Consul object, how to find the observed one, and how
//! to compare them. [`synchronize`] then applies at most one mutating call
//! per invocation.

mod auth_method;
mod binding;
mod evaluate;
mod role;

pub use binding::binding_description;
pub use evaluate::evaluate;

use std::fmt::Debug;

use async_trait::async_trait;
use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::consul::{AclClient, ConsulResult};
use crate::crd::{external_name, AclStatus};
use crate::Error;

/// A custom resource that manages one Consul ACL object
#[async_trait]
pub trait AclResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Consul representation of the managed object
    type Remote: Clone + Debug + Send + Sync;

    /// Finalizer guarding deletion of the Consul object
    const FINALIZER: &'static str;

    /// Current status, if any has been written
    fn acl_status(&self) -> Option<&AclStatus>;

    /// Check the resource spec for errors that no amount of retrying will fix
    fn validate(&self) -> Result<(), Error>;

    /// Build the Consul object this resource asks for
    async fn desired(
        &self,
        client: &dyn AclClient,
        external_name: &str,
    ) -> Result<Self::Remote, Error>;

    /// Find the Consul object carrying the managed name
    async fn read_by_name(
        client: &dyn AclClient,
        external_name: &str,
    ) -> ConsulResult<Option<Self::Remote>>;

    /// Find the Consul object by its identifier
    async fn read_by_id(client: &dyn AclClient, id: &str) -> ConsulResult<Option<Self::Remote>>;

    /// Create the object, returning it with its identifier
    async fn create(client: &dyn AclClient, desired: &Self::Remote) -> ConsulResult<Self::Remote>;

    /// Overwrite the object with the given identifier
    async fn update(
        client: &dyn AclClient,
        id: &str,
        desired: &Self::Remote,
    ) -> ConsulResult<Self::Remote>;

    /// Delete the observed object
    async fn delete(client: &dyn AclClient, observed: &Self::Remote) -> ConsulResult<()>;

    /// Identifier of a Consul object
    fn remote_id(remote: &Self::Remote) -> String;

    /// True when every field the resource spec controls matches
    fn converged(desired: &Self::Remote, observed: &Self::Remote) -> bool;
}

/// Consul name managed for a resource, `<namespace>_<name>`
pub fn managed_name<K: Resource>(obj: &K) -> String {
    external_name(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

/// How [`synchronize`] reached the desired state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncAction {
    /// A new Consul object was created
    Created,
    /// The object with the known identifier was updated
    Updated,
    /// An existing object with the managed name was taken over and updated
    Adopted,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Adopted => write!(f, "adopted"),
        }
    }
}

/// Result of a successful [`synchronize`]
#[derive(Clone, Debug)]
pub struct SyncOutcome<R> {
    /// Identifier of the Consul object, to be stored in status
    pub id: String,
    /// What was done
    pub action: SyncAction,
    /// The object as Consul returned it after the write
    pub remote: R,
}

/// Drive the Consul object toward `desired`
///
/// A known identifier is tried first. When the object behind it is gone the
/// identifier is treated as stale and the managed name is looked up so an
/// object created by an interrupted pass is adopted instead of duplicated.
/// Only when nothing is found is a new object created.
pub async fn synchronize<K: AclResource>(
    client: &dyn AclClient,
    external_name: &str,
    known_id: Option<&str>,
    desired: &K::Remote,
) -> ConsulResult<SyncOutcome<K::Remote>> {
    if let Some(id) = known_id.filter(|id| !id.is_empty()) {
        if K::read_by_id(client, id).await?.is_some() {
            let updated = K::update(client, id, desired).await?;
            debug!(name = %external_name, id, "updated consul object");
            return Ok(SyncOutcome {
                id: K::remote_id(&updated),
                action: SyncAction::Updated,
                remote: updated,
            });
        }
        info!(name = %external_name, id, "stored identifier is stale, looking up by name");
    }

    if let Some(existing) = K::read_by_name(client, external_name).await? {
        let id = K::remote_id(&existing);
        let updated = K::update(client, &id, desired).await?;
        info!(name = %external_name, id = %id, "adopted existing consul object");
        return Ok(SyncOutcome {
            id: K::remote_id(&updated),
            action: SyncAction::Adopted,
            remote: updated,
        });
    }

    let created = K::create(client, desired).await?;
    let id = K::remote_id(&created);
    info!(name = %external_name, id = %id, "created consul object");
    Ok(SyncOutcome {
        id,
        action: SyncAction::Created,
        remote: created,
    })
}

/// Remove the Consul object carrying the managed name
///
/// Returns true when something was deleted. Absence is success.
pub async fn delete_external<K: AclResource>(
    client: &dyn AclClient,
    external_name: &str,
) -> ConsulResult<bool> {
    match K::read_by_name(client, external_name).await? {
        Some(observed) => {
            K::delete(client, &observed).await?;
            info!(name = %external_name, id = %K::remote_id(&observed), "deleted consul object");
            Ok(true)
        }
        None => {
            debug!(name = %external_name, "consul object already absent");
            Ok(false)
        }
    }
}
