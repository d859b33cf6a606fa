use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::Container;

use super::{
    REDIS_TLS_SECRET, REPO_TLS_SECRET, RenderContext, env, merge_env, pod_template, selector,
    tcp_port, tls_mount, tls_volume,
};

const COMPONENT: &str = "application-controller";

/// Shared by the active StatefulSet and the forbidden Deployment form.
pub fn name(ctx: &RenderContext<'_>) -> String {
    ctx.object_name("application-controller")
}

pub fn statefulset(ctx: &RenderContext<'_>) -> StatefulSet {
    let name = name(ctx);
    let spec = &ctx.spec.controller;
    let processors = spec.processors.clone().unwrap_or_default();
    let mut command = vec![
        "argocd-application-controller".to_string(),
        "--operation-processors".to_string(),
        processors.operation.unwrap_or(10).to_string(),
        "--status-processors".to_string(),
        processors.status.unwrap_or(20).to_string(),
        "--repo-server".to_string(),
        ctx.repo_server_address(),
        "--redis".to_string(),
        ctx.redis_address(),
        "--loglevel".to_string(),
        spec.log_level.clone().unwrap_or_else(|| "info".into()),
    ];
    if ctx.spec.redis.disable_tls_verification {
        command.push("--redis-insecure-skip-tls-verify".into());
    }
    let container = Container {
        name: "argocd-application-controller".into(),
        image: Some(ctx.argocd_image(&spec.workload)),
        command: Some(command),
        env: Some(merge_env(
            vec![env(
                "ARGOCD_CONTROLLER_REPLICAS",
                ctx.controller_replicas.to_string(),
            )],
            &spec.workload.env,
        )),
        resources: spec.workload.resources.clone(),
        ports: Some(vec![tcp_port("metrics", 8082)]),
        volume_mounts: Some(vec![
            tls_mount("argocd-repo-server-tls", "/app/config/controller/tls"),
            tls_mount("argocd-operator-redis-tls", "/app/config/controller/tls/redis"),
        ]),
        ..Default::default()
    };
    StatefulSet {
        metadata: ctx.meta(&name, COMPONENT),
        spec: Some(StatefulSetSpec {
            replicas: Some(ctx.controller_replicas),
            selector: selector(ctx.selector_labels(&name)),
            template: pod_template(
                ctx.labels(&name, COMPONENT),
                container,
                Some(vec![
                    tls_volume("argocd-repo-server-tls", REPO_TLS_SECRET),
                    tls_volume("argocd-operator-redis-tls", REDIS_TLS_SECRET),
                ]),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}
