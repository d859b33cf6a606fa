use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::runtime::controller::Action;
use kube::runtime::events::Recorder;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument};

use super::engine::clock::{Clock, SystemClock};
use super::engine::lifecycle::ensure_absent;
use super::engine::rollout::{ContentChange, clear_checksum, reconcile_content_change};
use super::engine::sharding::{self, cluster_inventory};
use super::engine::workload::PodWorkload;
use super::engine::{FieldGroup, ObjectStep, ObjectStore, Outcome, fields, reconcile_object};
use super::events::{REASON_CREATED, REASON_DELETED, REASON_ROLLOUT_TRIGGERED, emit_event};
use super::plan::{Component, Plan, Step, TrackedTls};
use super::status::{FamilyHealth, observed};
use super::status_reducer::{merge_status, should_patch_status};
use super::{ControllerContext, ReconcileErr, into_internal};
use crate::config::ImageConfig;
use crate::crd::argocd::ArgoCD;
use crate::templates::{
    AUTO_TLS_ANNOTATIONS, RenderContext, application_controller, applicationset, configmaps,
    redis, repo, server,
};

/// Replica count last applied to the application controller.
pub const CONTROLLER_REPLICAS_ANNOTATION: &str = "argocd.argoproj.io/controller-replicas";

/// What one pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub outcomes: Vec<(Component, Outcome)>,
    pub rollouts: Vec<(TrackedTls, ContentChange)>,
    pub controller_replicas: i32,
    pub status_patched: bool,
}

impl PassReport {
    pub fn outcome(&self, component: Component) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| *c == component)
            .map(|(_, o)| o)
    }

    pub fn changed_objects(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.wrote()).count()
    }
}

fn record_controller_replicas(s: &mut StatefulSet) {
    let replicas = s.replicas().unwrap_or(sharding::DEFAULT_REPLICAS);
    s.annotations_mut()
        .insert(CONTROLLER_REPLICAS_ANNOTATION.into(), replicas.to_string());
}

fn controller_groups() -> Vec<FieldGroup<StatefulSet>> {
    fields::with_extra_on(
        fields::workload_groups::<StatefulSet>(),
        "spec.replicas",
        record_controller_replicas,
    )
}

async fn apply_component<S: ObjectStore>(
    store: &S,
    ctx: &RenderContext<'_>,
    component: Component,
) -> Result<Outcome, ReconcileErr> {
    let spec = ctx.spec;
    let owner = ctx.owner.clone();
    match component {
        Component::ArgoCdConfigMap => {
            let step = ObjectStep::new(
                configmaps::argocd_cm(ctx),
                true,
                fields::config_map_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::RbacConfigMap => {
            let step = ObjectStep::new(
                configmaps::argocd_rbac_cm(ctx),
                true,
                fields::config_map_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::RedisDeployment => {
            let step = ObjectStep::workload(
                redis::deployment(ctx),
                spec.redis_enabled(),
                fields::workload_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::RedisService => {
            let step = ObjectStep::new(
                redis::service(ctx),
                spec.redis_enabled(),
                fields::service_groups(),
                owner,
            )
            .with_owned_annotations(AUTO_TLS_ANNOTATIONS);
            reconcile_object(store, step).await
        }
        Component::RepoServerDeployment => {
            let step = ObjectStep::workload(
                repo::deployment(ctx),
                spec.repo_enabled(),
                fields::workload_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::RepoServerService => {
            let step = ObjectStep::new(
                repo::service(ctx),
                spec.repo_enabled(),
                fields::service_groups(),
                owner,
            )
            .with_owned_annotations(AUTO_TLS_ANNOTATIONS);
            reconcile_object(store, step).await
        }
        Component::ServerDeployment => {
            let step = ObjectStep::workload(
                server::deployment(ctx),
                spec.server_enabled(),
                fields::workload_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::ServerService => {
            let step = ObjectStep::new(
                server::service(ctx),
                spec.server_enabled(),
                fields::service_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::ServerAutoscaler => {
            let step = ObjectStep::new(
                server::autoscaler(ctx),
                spec.server_autoscaled(),
                fields::hpa_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::ControllerStatefulSet => {
            // Only the StatefulSet form may exist.
            let name = application_controller::name(ctx);
            let legacy = ensure_absent::<Deployment, S>(store, ctx.namespace, &name).await?;
            if legacy == Outcome::Deleted {
                info!(%name, "removed application controller Deployment");
            }
            let step = ObjectStep::workload(
                application_controller::statefulset(ctx),
                spec.controller_enabled(),
                controller_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
        Component::ApplicationSetDeployment => {
            let step = ObjectStep::workload(
                applicationset::deployment(ctx),
                spec.application_set_enabled(),
                fields::workload_groups(),
                owner,
            );
            reconcile_object(store, step).await
        }
    }
}

async fn propagate_tls<S, C>(
    store: &S,
    clock: &C,
    instance: &ArgoCD,
    ns: &str,
    name: &str,
    tracked: TrackedTls,
) -> Result<ContentChange, ReconcileErr>
where
    S: ObjectStore,
    C: Clock + ?Sized,
{
    if tracked.enabled(&instance.spec) {
        let content = tracked.content(name, ns);
        return reconcile_content_change::<ArgoCD, S, C>(store, clock, ns, name, &content).await;
    }
    let latest: Option<ArgoCD> = store.get(ns, name).await?;
    if let Some(latest) = latest {
        clear_checksum(store, &latest, ns, name, tracked.status_key()).await?;
    }
    Ok(ContentChange::NoContent)
}

async fn report_status<S, C>(
    store: &S,
    clock: &C,
    instance: &ArgoCD,
    ns: &str,
    name: &str,
) -> Result<bool, ReconcileErr>
where
    S: ObjectStore,
    C: Clock + ?Sized,
{
    let health = FamilyHealth::gather(store, name, ns, &instance.spec).await;
    let desired = observed(health, instance.meta().generation, clock.now().to_rfc3339());
    let latest: Option<ArgoCD> = store.get(ns, name).await?;
    let current = latest.as_ref().and_then(|l| l.status.as_ref());
    let mut merged = merge_status(current, desired);
    if !should_patch_status(current, &merged) {
        return Ok(false);
    }
    // Checksums are committed by the propagator alone.
    merged.checksums.clear();
    let body = serde_json::to_value(&merged)?;
    store.patch_status::<ArgoCD>(ns, name, &body).await?;
    debug!(phase = ?merged.phase, "status patched");
    Ok(true)
}

/// Execute `plan` once for `instance`.
#[instrument(
    skip_all,
    fields(ns = %instance.namespace().unwrap_or_default(), name = %instance.name_any())
)]
pub async fn run_pass<S, C>(
    store: &S,
    clock: &C,
    images: &ImageConfig,
    plan: &Plan,
    instance: &ArgoCD,
) -> Result<PassReport, ReconcileErr>
where
    S: ObjectStore,
    C: Clock + ?Sized,
{
    let ns = instance
        .namespace()
        .ok_or_else(|| ReconcileErr::Internal("ArgoCD without namespace".into()))?;
    let name = instance.name_any();
    let family_replicas = sharding::family_default(&instance.spec.controller.workload);
    let mut report = PassReport {
        controller_replicas: family_replicas,
        ..Default::default()
    };

    for step in plan.steps() {
        match *step {
            Step::CountClusters => {
                let inventory = cluster_inventory(store, &ns).await;
                report.controller_replicas = sharding::replicas(
                    &instance.spec.controller.sharding,
                    family_replicas,
                    inventory,
                );
            }
            Step::Apply(component) => {
                let ctx = RenderContext::new(instance, &ns, images, report.controller_replicas);
                let outcome = apply_component(store, &ctx, component).await?;
                report.outcomes.push((component, outcome));
            }
            Step::PropagateTls(tracked) => {
                let change =
                    propagate_tls(store, clock, instance, &ns, &name, tracked).await?;
                report.rollouts.push((tracked, change));
            }
            Step::ReportStatus => {
                report.status_patched =
                    report_status(store, clock, instance, &ns, &name).await?;
            }
        }
    }
    if report.changed_objects() > 0 {
        info!(changed = report.changed_objects(), "pass converged objects");
    }
    Ok(report)
}

async fn publish_events(recorder: &Recorder, instance: &ArgoCD, report: &PassReport) {
    for (component, outcome) in &report.outcomes {
        let (reason, action) = match outcome {
            Outcome::Created => (REASON_CREATED, "Create"),
            Outcome::Deleted => (REASON_DELETED, "Delete"),
            _ => continue,
        };
        emit_event(recorder, instance, reason, action, Some(format!("{component:?}"))).await;
    }
    for (tracked, change) in &report.rollouts {
        if let ContentChange::Rolled { triggered, .. } = change {
            if triggered.is_empty() {
                continue;
            }
            let note = format!(
                "{} changed; restarted {}",
                tracked.secret_name(),
                triggered.join(", ")
            );
            emit_event(recorder, instance, REASON_ROLLOUT_TRIGGERED, "Rollout", Some(note)).await;
        }
    }
}

#[instrument(
    skip_all,
    fields(ns = %obj.namespace().unwrap_or_default(), name = %obj.name_any())
)]
pub async fn reconcile(
    obj: Arc<ArgoCD>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    if obj.meta().deletion_timestamp.is_some() {
        debug!("instance is being deleted; owner references clean up children");
        return Ok(Action::await_change());
    }
    let plan = Plan::standard().map_err(into_internal)?;
    let report = run_pass(&ctx.store, &SystemClock, &ctx.cfg.images, &plan, &obj).await?;
    publish_events(&ctx.event_recorder, &obj, &report).await;
    Ok(Action::requeue(Duration::from_secs(ctx.cfg.resync_secs)))
}
