//! The ordered list of steps a pass executes for one instance.

use crate::controller::engine::rollout::{RolloutTrigger, TrackedContent, WorkloadKind};
use crate::crd::argocd::ArgoCDSpec;
use crate::templates::{REDIS_TLS_SECRET, REPO_TLS_SECRET};

/// Secrets that wake up every instance in their namespace when they change.
pub const TRACKED_SECRET_NAMES: [&str; 2] = [REDIS_TLS_SECRET, REPO_TLS_SECRET];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    ArgoCdConfigMap,
    RbacConfigMap,
    RedisDeployment,
    RedisService,
    RepoServerDeployment,
    RepoServerService,
    ServerDeployment,
    ServerService,
    ServerAutoscaler,
    ControllerStatefulSet,
    ApplicationSetDeployment,
}

/// TLS material whose rotation restarts the components that mount it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackedTls {
    Redis,
    RepoServer,
}

impl TrackedTls {
    pub fn secret_name(self) -> &'static str {
        match self {
            TrackedTls::Redis => REDIS_TLS_SECRET,
            TrackedTls::RepoServer => REPO_TLS_SECRET,
        }
    }

    pub fn status_key(self) -> &'static str {
        match self {
            TrackedTls::Redis => "redis-tls",
            TrackedTls::RepoServer => "repo-tls",
        }
    }

    pub fn label_key(self) -> &'static str {
        match self {
            TrackedTls::Redis => "redis.tls.cert.changed",
            TrackedTls::RepoServer => "repo.tls.cert.changed",
        }
    }

    /// Tracking stops when the family is served remotely or switched off.
    pub fn enabled(self, spec: &ArgoCDSpec) -> bool {
        match self {
            TrackedTls::Redis => spec.redis_enabled(),
            TrackedTls::RepoServer => spec.repo_enabled(),
        }
    }

    pub fn content(self, instance: &str, ns: &str) -> TrackedContent {
        let trigger = |kind, suffix: &str| RolloutTrigger {
            kind,
            namespace: ns.to_string(),
            name: format!("{instance}-{suffix}"),
            label_key: self.label_key(),
        };
        TrackedContent {
            secret_namespace: ns.to_string(),
            secret_name: self.secret_name().to_string(),
            status_key: self.status_key(),
            dependents: vec![
                trigger(WorkloadKind::Deployment, "server"),
                trigger(WorkloadKind::Deployment, "repo-server"),
                trigger(WorkloadKind::StatefulSet, "application-controller"),
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Count cluster secrets and compute controller replicas.
    CountClusters,
    Apply(Component),
    PropagateTls(TrackedTls),
    ReportStatus,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("{step:?} requires {missing:?} to run earlier")]
    MissingPrerequisite { step: Step, missing: Step },
    #[error("{0:?} appears more than once")]
    Duplicate(Step),
    #[error("status must be reported last")]
    StatusNotLast,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<Step>,
}

fn prerequisites(step: Step) -> &'static [Step] {
    const CONTROLLER_INPUTS: &[Step] = &[Step::CountClusters];
    const ROLLOUT_TARGETS: &[Step] = &[
        Step::Apply(Component::ServerDeployment),
        Step::Apply(Component::RepoServerDeployment),
        Step::Apply(Component::ControllerStatefulSet),
    ];
    match step {
        Step::Apply(Component::ControllerStatefulSet) => CONTROLLER_INPUTS,
        Step::PropagateTls(_) => ROLLOUT_TARGETS,
        _ => &[],
    }
}

impl Plan {
    /// Validate ordering: every prerequisite precedes its dependent, no
    /// step repeats and status reporting, if present, comes last.
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        for (i, step) in steps.iter().enumerate() {
            if steps[..i].contains(step) {
                return Err(PlanError::Duplicate(*step));
            }
            for missing in prerequisites(*step) {
                if !steps[..i].contains(missing) {
                    return Err(PlanError::MissingPrerequisite {
                        step: *step,
                        missing: *missing,
                    });
                }
            }
            if *step == Step::ReportStatus && i + 1 != steps.len() {
                return Err(PlanError::StatusNotLast);
            }
        }
        Ok(Self { steps })
    }

    pub fn standard() -> Result<Self, PlanError> {
        use Component::*;
        Self::new(vec![
            Step::Apply(ArgoCdConfigMap),
            Step::Apply(RbacConfigMap),
            Step::Apply(RedisService),
            Step::Apply(RedisDeployment),
            Step::Apply(RepoServerService),
            Step::Apply(RepoServerDeployment),
            Step::Apply(ServerService),
            Step::Apply(ServerDeployment),
            Step::Apply(ServerAutoscaler),
            Step::CountClusters,
            Step::Apply(ControllerStatefulSet),
            Step::Apply(ApplicationSetDeployment),
            Step::PropagateTls(TrackedTls::Redis),
            Step::PropagateTls(TrackedTls::RepoServer),
            Step::ReportStatus,
        ])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_plan_is_valid() {
        let plan = Plan::standard().unwrap();
        assert_eq!(plan.steps().last(), Some(&Step::ReportStatus));
    }

    #[test]
    fn controller_before_shard_count_is_rejected() {
        let err = Plan::new(vec![
            Step::Apply(Component::ControllerStatefulSet),
            Step::CountClusters,
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::MissingPrerequisite {
                step: Step::Apply(Component::ControllerStatefulSet),
                missing: Step::CountClusters,
            }
        );
    }

    #[test]
    fn rollout_needs_its_targets_applied() {
        let err = Plan::new(vec![Step::PropagateTls(TrackedTls::Redis)]).unwrap_err();
        assert!(matches!(err, PlanError::MissingPrerequisite { .. }));
    }

    #[test]
    fn duplicates_and_late_status_are_rejected() {
        assert_eq!(
            Plan::new(vec![Step::CountClusters, Step::CountClusters]).unwrap_err(),
            PlanError::Duplicate(Step::CountClusters)
        );
        assert_eq!(
            Plan::new(vec![Step::ReportStatus, Step::CountClusters]).unwrap_err(),
            PlanError::StatusNotLast
        );
    }

    #[test]
    fn tracked_content_targets_three_workloads() {
        let content = TrackedTls::RepoServer.content("example", "argocd");
        assert_eq!(content.secret_name, "argocd-repo-server-tls");
        let names: Vec<_> = content.dependents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            ["example-server", "example-repo-server", "example-application-controller"]
        );
        assert!(content.dependents.iter().all(|d| d.label_key == "repo.tls.cert.changed"));
    }
}
