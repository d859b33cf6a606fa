use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{Container, Service, ServiceSpec};

use super::{
    REDIS_TLS_SECRET, REPO_TLS_SECRET, RenderContext, SERVER_PORT, env, merge_env, pod_template,
    selector, service_port, tcp_port, tls_mount, tls_volume,
};

const COMPONENT: &str = "server";

pub fn name(ctx: &RenderContext<'_>) -> String {
    ctx.object_name("server")
}

pub fn deployment(ctx: &RenderContext<'_>) -> Deployment {
    let name = name(ctx);
    let overrides = &ctx.spec.server.workload;
    let mut command = vec![
        "argocd-server".to_string(),
        "--staticassets".to_string(),
        "/shared/app".to_string(),
        "--repo-server".to_string(),
        ctx.repo_server_address(),
        "--redis".to_string(),
        ctx.redis_address(),
    ];
    if ctx.spec.server.insecure {
        command.push("--insecure".into());
    }
    let container = Container {
        name: "argocd-server".into(),
        image: Some(ctx.argocd_image(overrides)),
        command: Some(command),
        env: Some(merge_env(
            vec![env("ARGOCD_SERVER_INSECURE", ctx.spec.server.insecure.to_string())],
            &overrides.env,
        )),
        resources: overrides.resources.clone(),
        ports: Some(vec![tcp_port("http", SERVER_PORT), tcp_port("metrics", 8083)]),
        volume_mounts: Some(vec![
            tls_mount("argocd-repo-server-tls", "/app/config/server/tls"),
            tls_mount("argocd-operator-redis-tls", "/app/config/server/tls/redis"),
        ]),
        ..Default::default()
    };
    // The autoscaler owns the replica count when enabled.
    let replicas = if ctx.spec.server_autoscaled() {
        None
    } else {
        Some(overrides.replicas.unwrap_or(1))
    };
    Deployment {
        metadata: ctx.meta(&name, COMPONENT),
        spec: Some(DeploymentSpec {
            replicas,
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
    Service {
        metadata: ctx.meta(&name, COMPONENT),
        spec: Some(ServiceSpec {
            selector: Some(ctx.selector_labels(&name)),
            ports: Some(vec![
                service_port("http", 80, SERVER_PORT),
                service_port("https", 443, SERVER_PORT),
            ]),
            type_: Some("ClusterIP".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn autoscaler(ctx: &RenderContext<'_>) -> HorizontalPodAutoscaler {
    let name = name(ctx);
    let autoscale = &ctx.spec.server.autoscale;
    let min_replicas = autoscale.min_replicas.unwrap_or(1).max(1);
    let max_replicas = autoscale.max_replicas.unwrap_or(3).max(min_replicas);
    HorizontalPodAutoscaler {
        metadata: ctx.meta(&name, COMPONENT),
        spec: Some(HorizontalPodAutoscalerSpec {
            min_replicas: Some(min_replicas),
            max_replicas,
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".into()),
                kind: "Deployment".into(),
                name: name.clone(),
            },
            metrics: Some(vec![MetricSpec {
                type_: "Resource".into(),
                resource: Some(ResourceMetricSource {
                    name: "cpu".into(),
                    target: MetricTarget {
                        type_: "Utilization".into(),
                        average_utilization: Some(
                            autoscale.target_cpu_utilization_percentage.unwrap_or(50),
                        ),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
