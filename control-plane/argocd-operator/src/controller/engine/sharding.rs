//! Application-controller replica count.

use k8s_openapi::api::core::v1::Secret;
use tracing::{debug, warn};

use super::store::ObjectStore;
use crate::controller::ReconcileErr;
use crate::crd::argocd::{ShardingSpec, WorkloadOverrides};

pub const CLUSTER_SECRET_LABEL: &str = "argocd.argoproj.io/secret-type";
pub const CLUSTER_SECRET_VALUE: &str = "cluster";

/// Replicas when nothing more specific applies.
pub const DEFAULT_REPLICAS: i32 = 1;

/// The family's own `replicas` override, or [`DEFAULT_REPLICAS`].
pub fn family_default(overrides: &WorkloadOverrides) -> i32 {
    match overrides.replicas {
        Some(r) if r >= 0 => r,
        Some(r) => {
            invalid(format!("replicas {r} is negative; using {DEFAULT_REPLICAS}"));
            DEFAULT_REPLICAS
        }
        None => DEFAULT_REPLICAS,
    }
}

/// Clamped dynamic-scaling bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardBounds {
    pub min_shards: i32,
    pub max_shards: i32,
    pub clusters_per_shard: i32,
}

fn invalid(msg: String) {
    warn!(error = %ReconcileErr::InvalidConfiguration(msg), "clamping sharding input");
}

impl ShardBounds {
    /// Clamp raw inputs: `min >= 1`, `max >= min`, `per_shard >= 1`.
    pub fn clamped(spec: &ShardingSpec) -> Self {
        let mut min_shards = spec.min_shards.unwrap_or(1);
        if min_shards < 1 {
            invalid(format!("minShards {min_shards} is below 1; using 1"));
            min_shards = 1;
        }
        let mut max_shards = spec.max_shards.unwrap_or(min_shards);
        if max_shards < min_shards {
            invalid(format!(
                "maxShards {max_shards} is below minShards {min_shards}; using {min_shards}"
            ));
            max_shards = min_shards;
        }
        let mut clusters_per_shard = spec.clusters_per_shard.unwrap_or(1);
        if clusters_per_shard < 1 {
            invalid(format!(
                "clustersPerShard {clusters_per_shard} is below 1; using 1"
            ));
            clusters_per_shard = 1;
        }
        Self {
            min_shards,
            max_shards,
            clusters_per_shard,
        }
    }

    pub fn shards_for(&self, clusters: usize) -> i32 {
        let clusters = i32::try_from(clusters).unwrap_or(i32::MAX);
        (clusters / self.clusters_per_shard).clamp(self.min_shards, self.max_shards)
    }
}

/// Replica count for the application controller.
///
/// `inventory` is the number of cluster secrets, or `None` when it could
/// not be determined. `default` applies whenever sharding has no say.
pub fn replicas(spec: &ShardingSpec, default: i32, inventory: Option<usize>) -> i32 {
    let dynamic = spec.dynamic_scaling_enabled.unwrap_or(false);
    if !dynamic {
        return match spec.replicas {
            Some(r) if spec.enabled && r >= 0 => r,
            _ => default,
        };
    }
    match inventory {
        Some(clusters) => ShardBounds::clamped(spec).shards_for(clusters),
        None => {
            debug!(default, "cluster inventory unknown; using default replicas");
            default
        }
    }
}

/// Count cluster secrets in `ns`. A failed lookup is logged and reported
/// as `None` so the pass can continue with the default.
pub async fn cluster_inventory<S: ObjectStore>(store: &S, ns: &str) -> Option<usize> {
    let selector = format!("{CLUSTER_SECRET_LABEL}={CLUSTER_SECRET_VALUE}");
    match store.list::<Secret>(ns, &selector).await {
        Ok(secrets) => Some(secrets.len()),
        Err(e) => {
            warn!(%ns, error = %e, "listing cluster secrets failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic(min: i32, max: i32, per_shard: i32) -> ShardingSpec {
        ShardingSpec {
            enabled: true,
            dynamic_scaling_enabled: Some(true),
            min_shards: Some(min),
            max_shards: Some(max),
            clusters_per_shard: Some(per_shard),
            ..Default::default()
        }
    }

    #[test]
    fn bounds_are_clamped() {
        let b = ShardBounds::clamped(&dynamic(0, 3, 0));
        assert_eq!(b.min_shards, 1);
        assert_eq!(b.clusters_per_shard, 1);

        let b = ShardBounds::clamped(&dynamic(5, 2, 1));
        assert_eq!(b.max_shards, 5);
    }

    #[test]
    fn dynamic_count_is_clamped_into_range() {
        // 23 / 5 = 4, inside [1, 10]
        assert_eq!(replicas(&dynamic(1, 10, 5), DEFAULT_REPLICAS, Some(23)), 4);
        // 23 / 5 = 4, above max 3
        assert_eq!(replicas(&dynamic(1, 3, 5), DEFAULT_REPLICAS, Some(23)), 3);
        // 0 clusters, below min
        assert_eq!(replicas(&dynamic(2, 4, 5), DEFAULT_REPLICAS, Some(0)), 2);
    }

    #[test]
    fn ten_clusters_two_per_shard() {
        assert_eq!(replicas(&dynamic(1, 8, 2), DEFAULT_REPLICAS, Some(10)), 5);
    }

    #[test]
    fn unknown_inventory_falls_back_to_default() {
        assert_eq!(replicas(&dynamic(3, 8, 2), DEFAULT_REPLICAS, None), DEFAULT_REPLICAS);
    }

    #[test]
    fn static_override_requires_sharding_enabled() {
        let mut spec = ShardingSpec {
            enabled: true,
            replicas: Some(3),
            ..Default::default()
        };
        assert_eq!(replicas(&spec, DEFAULT_REPLICAS, Some(100)), 3);

        spec.enabled = false;
        assert_eq!(replicas(&spec, DEFAULT_REPLICAS, Some(100)), DEFAULT_REPLICAS);

        spec.enabled = true;
        spec.replicas = Some(-1);
        assert_eq!(replicas(&spec, DEFAULT_REPLICAS, None), DEFAULT_REPLICAS);
    }

    #[test]
    fn zero_override_is_honoured() {
        let spec = ShardingSpec {
            enabled: true,
            replicas: Some(0),
            ..Default::default()
        };
        assert_eq!(replicas(&spec, DEFAULT_REPLICAS, None), 0);
    }

    #[test]
    fn family_override_is_the_fallback() {
        let overrides = WorkloadOverrides {
            replicas: Some(3),
            ..Default::default()
        };
        let default = family_default(&overrides);
        assert_eq!(default, 3);
        assert_eq!(replicas(&ShardingSpec::default(), default, Some(40)), 3);
        assert_eq!(replicas(&dynamic(1, 8, 2), default, None), 3);
        // an enabled static shard count still wins
        let spec = ShardingSpec {
            enabled: true,
            replicas: Some(2),
            ..Default::default()
        };
        assert_eq!(replicas(&spec, default, None), 2);

        let negative = WorkloadOverrides {
            replicas: Some(-2),
            ..Default::default()
        };
        assert_eq!(family_default(&negative), DEFAULT_REPLICAS);
    }
}
