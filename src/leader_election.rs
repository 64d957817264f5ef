//! Leader election using Kubernetes Leases
//!
//! When several operator replicas run, only the holder of the
//! `coordination.k8s.io/v1` Lease runs controllers. The others wait and take
//! over once the lease expires or is released.
//!
//! # Atomicity
//!
//! Renewals and takeovers replace the Lease with the resourceVersion that was
//! read. If another replica wrote in between, the API server answers 409 and
//! this replica does not consider itself leader.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::FIELD_MANAGER;

/// Lease name shared by all operator replicas
pub const LEADER_LEASE_NAME: &str = "consul-acl-operator-leader";

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderElectionError {
    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The Lease came back without a resourceVersion
    #[error("lease {0} has no resourceVersion")]
    MissingResourceVersion(String),
}

/// What this replica may do with the lease as it stands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseClaim {
    /// We hold it; refresh the renew time
    Renew,
    /// Expired or released; take it over as transition number `transitions`
    TakeOver {
        /// Value for `leaseTransitions` after the takeover
        transitions: i32,
    },
    /// Another replica holds a live lease
    HeldBy(String),
}

/// Decide how `identity` can claim a lease with the given spec at `now`
///
/// A lease without a holder, or whose renew time plus duration lies in the
/// past, is free to take.
pub fn claim_lease(spec: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>) -> LeaseClaim {
    let holder = spec.and_then(|s| s.holder_identity.as_deref());
    if holder == Some(identity) {
        return LeaseClaim::Renew;
    }

    let renew_time = spec.and_then(|s| s.renew_time.as_ref());
    let duration_secs = spec.and_then(|s| s.lease_duration_seconds);
    let expired = match (holder, renew_time, duration_secs) {
        (None, _, _) => true,
        (Some(_), Some(rt), Some(secs)) => now > rt.0 + chrono::Duration::seconds(i64::from(secs)),
        _ => true,
    };

    if expired {
        let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);
        LeaseClaim::TakeOver {
            transitions: transitions.saturating_add(1),
        }
    } else {
        LeaseClaim::HeldBy(holder.unwrap_or_default().to_string())
    }
}

/// Identity of this replica: `POD_NAME`, then `HOSTNAME`, then a random name
pub fn replica_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{}-{:08x}", crate::CONTROLLER_NAME, rand::random::<u32>()))
}

/// Leader elector using Kubernetes Leases
pub struct LeaderElector {
    client: Client,
    lease_name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_interval: Duration,
    retry_interval: Duration,
}

impl LeaderElector {
    /// Create a new leader elector with default timing (30s lease, 10s renew, 5s retry)
    pub fn new(client: Client, lease_name: &str, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            lease_duration: LEASE_DURATION,
            renew_interval: RENEW_INTERVAL,
            retry_interval: RETRY_INTERVAL,
        }
    }

    /// Block until leadership is acquired, then return a guard that keeps renewing
    pub async fn acquire(self: Arc<Self>) -> LeaderGuard {
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            namespace = %self.namespace,
            "waiting for leadership"
        );

        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "leadership acquired");
                    return self.create_guard();
                }
                Ok(false) => {
                    debug!(identity = %self.identity, "lease held by another replica");
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "failed to acquire lease");
                }
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    fn create_guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal_task = tokio::spawn(async move {
            elector.renewal_loop(lost_tx).await;
        });

        LeaderGuard {
            elector: Arc::clone(self),
            renewal_task,
            lost_rx: Some(lost_rx),
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();

        let existing = match api.get(&self.lease_name).await {
            Ok(lease) => lease,
            Err(kube::Error::Api(e)) if e.code == 404 => return self.create_lease(&api, now).await,
            Err(e) => return Err(e.into()),
        };

        let resource_version = existing
            .metadata
            .resource_version
            .clone()
            .ok_or_else(|| LeaderElectionError::MissingResourceVersion(self.lease_name.clone()))?;

        let spec = match claim_lease(existing.spec.as_ref(), &self.identity, now) {
            LeaseClaim::HeldBy(holder) => {
                debug!(identity = %self.identity, %holder, "lease is live");
                return Ok(false);
            }
            LeaseClaim::Renew => LeaseSpec {
                renew_time: Some(MicroTime(now)),
                ..existing.spec.clone().unwrap_or_default()
            },
            LeaseClaim::TakeOver { transitions } => {
                info!(identity = %self.identity, transitions, "taking over expired lease");
                self.fresh_spec(now, transitions)
            }
        };

        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version: Some(resource_version),
                ..Default::default()
            },
            spec: Some(spec),
        };

        match api
            .replace(&self.lease_name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "lease changed under us");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn fresh_spec(&self, now: DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }

    async fn create_lease(
        &self,
        api: &Api<Lease>,
        now: DateTime<Utc>,
    ) -> Result<bool, LeaderElectionError> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(self.fresh_spec(now, 0)),
        };

        match api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!(identity = %self.identity, "created lease");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn renewal_loop(&self, lost_tx: oneshot::Sender<()>) {
        loop {
            tokio::time::sleep(self.renew_interval).await;

            match self.try_acquire_or_renew().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(identity = %self.identity, "leadership lost");
                    break;
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "lease renewal failed, leadership lost");
                    break;
                }
            }
        }
        let _ = lost_tx.send(());
    }

    /// Clear the holder so a standby can take over without waiting for expiry
    async fn release_lease(&self) -> Result<(), LeaderElectionError> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);

        let lease = match api.get(&self.lease_name).await {
            Ok(l) => l,
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            debug!(identity = %self.identity, "not the lease holder, nothing to release");
            return Ok(());
        }

        let patch = json!({
            "spec": {
                "holderIdentity": null,
                "renewTime": null
            }
        });
        api.patch(
            &self.lease_name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        info!(identity = %self.identity, "lease released");
        Ok(())
    }
}

/// Held while this replica is leader
///
/// The lease is renewed in the background until the guard is dropped.
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Wait until leadership is lost
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    /// Give up leadership now; call on graceful shutdown
    pub async fn release_leadership(&self) -> Result<(), LeaderElectionError> {
        self.renewal_task.abort();
        self.elector.release_lease().await
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.renewal_task.abort();
        info!(identity = %self.elector.identity, "leadership released");
    }
}
