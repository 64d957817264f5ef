//! Health classification of a resource from desired and observed state

use super::AclResource;
use crate::crd::HealthStatus;

/// Classify the Consul object against the resource spec
///
/// A failed sync wins over everything else. Otherwise the object must exist,
/// carry the identifier recorded in status, and match on every field the
/// spec controls to be Healthy.
pub fn evaluate<K: AclResource>(
    desired: &K::Remote,
    observed: Option<&K::Remote>,
    known_id: Option<&str>,
    sync_failed: bool,
) -> HealthStatus {
    if sync_failed {
        return HealthStatus::Degraded;
    }

    let Some(observed) = observed else {
        return HealthStatus::Missing;
    };

    let id_matches = known_id.is_some_and(|id| id == K::remote_id(observed));
    if id_matches && K::converged(desired, observed) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Progressing
    }
}
