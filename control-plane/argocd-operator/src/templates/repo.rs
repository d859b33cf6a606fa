use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, Service, ServiceSpec};

use super::{
    REDIS_TLS_SECRET, REPO_PORT, REPO_TLS_SECRET, RenderContext, auto_tls_annotations, env,
    merge_env, pod_template, selector, service_port, tcp_port, tls_mount, tls_volume,
};

const COMPONENT: &str = "repo-server";

pub fn name(ctx: &RenderContext<'_>) -> String {
    ctx.object_name("repo-server")
}

pub fn deployment(ctx: &RenderContext<'_>) -> Deployment {
    let name = name(ctx);
    let overrides = &ctx.spec.repo.workload;
    let mut command = vec![
        "uid_entrypoint.sh".to_string(),
        "argocd-repo-server".to_string(),
        "--redis".to_string(),
        ctx.redis_address(),
    ];
    if ctx.spec.redis.disable_tls_verification {
        command.push("--redis-insecure-skip-tls-verify".into());
    }
    let container = Container {
        name: "argocd-repo-server".into(),
        image: Some(ctx.argocd_image(overrides)),
        command: Some(command),
        env: Some(merge_env(
            vec![env("ARGOCD_REPO_SERVER_NAME", name.clone())],
            &overrides.env,
        )),
        resources: overrides.resources.clone(),
        ports: Some(vec![
            tcp_port("server", REPO_PORT),
            tcp_port("metrics", 8084),
        ]),
        volume_mounts: Some(vec![
            tls_mount("argocd-repo-server-tls", "/app/config/reposerver/tls"),
            tls_mount("argocd-operator-redis-tls", "/app/config/reposerver/tls/redis"),
        ]),
        ..Default::default()
    };
    Deployment {
        metadata: ctx.meta(&name, COMPONENT),
        spec: Some(DeploymentSpec {
            replicas: Some(overrides.replicas.unwrap_or(1)),
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

pub fn service(ctx: &RenderContext<'_>) -> Service {
    let name = name(ctx);
    let mut metadata = ctx.meta(&name, COMPONENT);
    metadata.annotations = auto_tls_annotations(ctx.spec.repo.autotls.as_deref(), REPO_TLS_SECRET);
    Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(ctx.selector_labels(&name)),
            ports: Some(vec![
                service_port("server", REPO_PORT, REPO_PORT),
                service_port("metrics", 8084, 8084),
            ]),
            type_: Some("ClusterIP".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
