use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use tracing::debug;

use crate::controller::engine::prober::probe;
use crate::controller::engine::store::ObjectStore;
use crate::controller::engine::workload::PodWorkload;
use crate::crd::argocd::{ArgoCDSpec, ArgoCDStatus, Condition, ConditionStatus, ConditionType};

pub const HEALTH_RUNNING: &str = "Running";
pub const HEALTH_PENDING: &str = "Pending";
pub const HEALTH_UNKNOWN: &str = "Unknown";
pub const HEALTH_DISABLED: &str = "Disabled";

pub const PHASE_AVAILABLE: &str = "Available";
pub const PHASE_PENDING: &str = "Pending";

/// Health of one workload family.
pub async fn workload_health<W, S>(store: &S, ns: &str, name: &str, enabled: bool) -> String
where
    W: PodWorkload,
    S: ObjectStore,
{
    if !enabled {
        return HEALTH_DISABLED.into();
    }
    match probe::<W, S>(store, ns, name).await {
        Ok(Some(w)) => {
            let want = w.replicas().unwrap_or(1);
            if w.ready_replicas() >= want {
                HEALTH_RUNNING.into()
            } else {
                HEALTH_PENDING.into()
            }
        }
        Ok(None) => HEALTH_PENDING.into(),
        Err(e) => {
            debug!(%ns, %name, error = %e, "health lookup failed");
            HEALTH_UNKNOWN.into()
        }
    }
}

/// Per-family health gathered for one instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FamilyHealth {
    pub application_controller: String,
    pub redis: String,
    pub repo: String,
    pub server: String,
    pub application_set_controller: String,
}

impl FamilyHealth {
    pub async fn gather<S: ObjectStore>(
        store: &S,
        instance: &str,
        ns: &str,
        spec: &ArgoCDSpec,
    ) -> Self {
        let name = |suffix: &str| format!("{instance}-{suffix}");
        Self {
            application_controller: workload_health::<StatefulSet, S>(
                store,
                ns,
                &name("application-controller"),
                spec.controller_enabled(),
            )
            .await,
            redis: workload_health::<Deployment, S>(
                store,
                ns,
                &name("redis"),
                spec.redis_enabled(),
            )
            .await,
            repo: workload_health::<Deployment, S>(
                store,
                ns,
                &name("repo-server"),
                spec.repo_enabled(),
            )
            .await,
            server: workload_health::<Deployment, S>(
                store,
                ns,
                &name("server"),
                spec.server_enabled(),
            )
            .await,
            application_set_controller: workload_health::<Deployment, S>(
                store,
                ns,
                &name("applicationset-controller"),
                spec.application_set_enabled(),
            )
            .await,
        }
    }

    fn all(&self) -> [&str; 5] {
        [
            &self.application_controller,
            &self.redis,
            &self.repo,
            &self.server,
            &self.application_set_controller,
        ]
    }

    /// Every enabled family is running.
    pub fn available(&self) -> bool {
        self.all()
            .iter()
            .all(|h| *h == HEALTH_RUNNING || *h == HEALTH_DISABLED)
    }
}

/// Status the pass wants to report. Checksums are never part of it.
pub fn observed(health: FamilyHealth, generation: Option<i64>, now: String) -> ArgoCDStatus {
    let available = health.available();
    let (phase, available_status, reason) = if available {
        (PHASE_AVAILABLE, ConditionStatus::True, "AllComponentsRunning")
    } else {
        (PHASE_PENDING, ConditionStatus::False, "ComponentsPending")
    };
    ArgoCDStatus {
        phase: Some(phase.into()),
        observed_generation: generation,
        last_updated: Some(now.clone()),
        application_controller: Some(health.application_controller),
        redis: Some(health.redis),
        repo: Some(health.repo),
        server: Some(health.server),
        application_set_controller: Some(health.application_set_controller),
        conditions: Some(vec![
            Condition {
                type_: ConditionType::Available,
                status: available_status,
                reason: Some(reason.into()),
                message: None,
                last_transition_time: Some(now.clone()),
            },
            Condition {
                type_: ConditionType::Reconciled,
                status: ConditionStatus::True,
                reason: Some("ReconcileSucceeded".into()),
                message: None,
                last_transition_time: Some(now),
            },
        ]),
        checksums: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(values: [&str; 5]) -> FamilyHealth {
        FamilyHealth {
            application_controller: values[0].into(),
            redis: values[1].into(),
            repo: values[2].into(),
            server: values[3].into(),
            application_set_controller: values[4].into(),
        }
    }

    #[test]
    fn disabled_families_do_not_block_availability() {
        let h = health([
            HEALTH_RUNNING,
            HEALTH_DISABLED,
            HEALTH_RUNNING,
            HEALTH_RUNNING,
            HEALTH_DISABLED,
        ]);
        assert!(h.available());
        let status = observed(h, Some(3), "t".into());
        assert_eq!(status.phase.as_deref(), Some(PHASE_AVAILABLE));
        assert_eq!(status.observed_generation, Some(3));
        assert!(status.checksums.is_empty());
    }

    #[test]
    fn any_pending_family_keeps_phase_pending() {
        let h = health([
            HEALTH_RUNNING,
            HEALTH_PENDING,
            HEALTH_RUNNING,
            HEALTH_UNKNOWN,
            HEALTH_DISABLED,
        ]);
        assert!(!h.available());
        let status = observed(h, None, "t".into());
        assert_eq!(status.phase.as_deref(), Some(PHASE_PENDING));
        let available = &status.conditions.unwrap()[0];
        assert_eq!(available.status, ConditionStatus::False);
    }
}
