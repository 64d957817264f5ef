//! Access to the ACL custom resources in the Kubernetes API

use std::marker::PhantomData;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::crd::AclStatus;
use crate::sync::AclResource;
use crate::{Error, FIELD_MANAGER};

/// Reads and writes of a resource kind that reconciliation needs
///
/// This trait allows mocking Kubernetes in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore<K: AclResource>: Send + Sync {
    /// Fetch the latest copy of an object; `None` when it no longer exists
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>;

    /// Add a finalizer if not already present
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Merge-patch the status subresource
    async fn patch_status(&self, namespace: &str, name: &str, status: &AclStatus)
        -> Result<(), Error>;
}

/// [`ObjectStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K: AclResource> KubeStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Status patch with explicit nulls so cleared fields are removed
pub fn status_patch(status: &AclStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "id": status.id,
            "health": status.health,
            "message": status.message,
            "observedGeneration": status.observed_generation,
            "lastSyncTime": status.last_sync_time,
        }
    })
}

#[async_trait]
impl<K: AclResource> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.api(namespace);
        let obj = api.get(name).await?;
        let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.api(namespace);
        let Some(obj) = api.get_opt(name).await? else {
            debug!(namespace, name, "object already gone, nothing to unblock");
            return Ok(());
        };
        let finalizers: Vec<String> = obj
            .meta()
            .finalizers
            .iter()
            .flatten()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect();

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        match api
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AclStatus,
    ) -> Result<(), Error> {
        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&status_patch(status)),
            )
            .await?;
        Ok(())
    }
}
