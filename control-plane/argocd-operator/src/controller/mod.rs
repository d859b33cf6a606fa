use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::runtime::events::{Recorder, Reporter};
use kube::runtime::reflector::ObjectRef;
use kube::{
    Client, Resource, ResourceExt,
    api::Api,
    runtime::{Controller, controller::Action, watcher::Config},
};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::argocd::ArgoCD;

pub mod engine;
pub mod events;
pub mod plan;
pub mod reconcile;
pub mod status;
pub mod status_reducer;

#[cfg(test)]
mod status_reducer_tests;

use engine::store::KubeStore;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    /// Expected: drives the create path and is never logged as an error.
    #[error("not found: {0}")]
    NotFound(String),
    /// Optimistic-concurrency conflict or AlreadyExists; re-read and retry.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient api error: {0}")]
    Transient(String),
    /// Produced by clamping code paths and logged; never returned from a pass.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileErr {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileErr::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileErr::Conflict(_))
    }
}

impl From<kube::Error> for ReconcileErr {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(resp) if resp.code == 404 => {
                ReconcileErr::NotFound(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                ReconcileErr::Conflict(resp.message.clone())
            }
            kube::Error::SerdeError(se) => {
                ReconcileErr::Internal(format!("decode: {se}"))
            }
            _ => ReconcileErr::Transient(e.to_string()),
        }
    }
}

pub(crate) fn into_internal<E: std::fmt::Display>(e: E) -> ReconcileErr {
    ReconcileErr::Internal(e.to_string())
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub store: KubeStore,
    pub event_recorder: Recorder,
}

impl ControllerContext {
    pub fn new(client: Client, cfg: OperatorConfig) -> Self {
        let reporter = Reporter {
            controller: cfg.field_manager.clone(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            store: KubeStore::new(client.clone(), cfg.field_manager.clone()),
            event_recorder: Recorder::new(client.clone(), reporter),
            client,
            cfg,
        }
    }
}

/// Secrets whose changes must wake up the instances in their namespace.
fn is_tracked_secret(secret: &Secret) -> bool {
    let name = secret.name_any();
    if plan::TRACKED_SECRET_NAMES.contains(&name.as_str()) {
        return true;
    }
    secret
        .labels()
        .get(engine::sharding::CLUSTER_SECRET_LABEL)
        .map(|v| v == engine::sharding::CLUSTER_SECRET_VALUE)
        .unwrap_or(false)
}

fn scoped_api<K>(client: &Client, ns: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match ns {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let ns = cfg.watch_namespace.clone();
    let api: Api<ArgoCD> = scoped_api(&client, ns.as_deref());
    let ctx = Arc::new(ControllerContext::new(client.clone(), cfg));
    info!(namespace = ?ns, "starting ArgoCD controller");

    let controller = Controller::new(api, Config::default());
    let instances = controller.store();

    controller
        .owns(scoped_api::<Deployment>(&client, ns.as_deref()), Config::default())
        .owns(scoped_api::<StatefulSet>(&client, ns.as_deref()), Config::default())
        .owns(scoped_api::<Service>(&client, ns.as_deref()), Config::default())
        .owns(scoped_api::<ConfigMap>(&client, ns.as_deref()), Config::default())
        .owns(
            scoped_api::<HorizontalPodAutoscaler>(&client, ns.as_deref()),
            Config::default(),
        )
        .watches(
            scoped_api::<Secret>(&client, ns.as_deref()),
            Config::default(),
            move |secret: Secret| {
                if !is_tracked_secret(&secret) {
                    return Vec::new();
                }
                let secret_ns = secret.namespace();
                instances
                    .state()
                    .into_iter()
                    .filter(|i| i.namespace() == secret_ns)
                    .map(|i| ObjectRef::from_obj(&*i))
                    .collect::<Vec<_>>()
            },
        )
        .shutdown_on_signal()
        .run(reconcile::reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    debug!(object = %obj_ref, ?action, "reconciled")
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

fn error_policy(
    obj: Arc<ArgoCD>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    let name = obj.name_any();
    match err {
        ReconcileErr::Conflict(msg) => {
            debug!(%name, %msg, "conflict; re-reading shortly");
            Action::requeue(Duration::from_millis(ctx.cfg.conflict_requeue_ms))
        }
        ReconcileErr::NotFound(msg) => {
            debug!(%name, %msg, "object vanished mid-pass; retrying");
            Action::requeue(Duration::from_millis(ctx.cfg.conflict_requeue_ms))
        }
        other => {
            warn!(%name, error = %other, "pass failed; backing off");
            Action::requeue(Duration::from_secs(ctx.cfg.error_requeue_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn secret(name: &str, labels: &[(&str, &str)]) -> Secret {
        let mut s = Secret::default();
        s.metadata.name = Some(name.into());
        if !labels.is_empty() {
            s.metadata.labels = Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }
        s
    }

    #[test]
    fn tracked_secrets_include_tls_and_cluster_secrets() {
        assert!(is_tracked_secret(&secret("argocd-operator-redis-tls", &[])));
        assert!(is_tracked_secret(&secret("argocd-repo-server-tls", &[])));
        assert!(is_tracked_secret(&secret(
            "prod-cluster",
            &[("argocd.argoproj.io/secret-type", "cluster")]
        )));
        assert!(!is_tracked_secret(&secret(
            "repo-creds",
            &[("argocd.argoproj.io/secret-type", "repository")]
        )));
    }

    #[test]
    fn kube_errors_map_to_reconcile_classes() {
        let resp = |code: u16| {
            kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".into(),
                message: format!("code {code}"),
                reason: "".into(),
                code,
            })
        };
        assert!(ReconcileErr::from(resp(404)).is_not_found());
        assert!(ReconcileErr::from(resp(409)).is_conflict());
        assert!(matches!(
            ReconcileErr::from(resp(503)),
            ReconcileErr::Transient(_)
        ));
    }
}
