use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, Service, ServiceSpec};

use super::{
    REDIS_PORT, REDIS_TLS_SECRET, RenderContext, auto_tls_annotations, image_ref, merge_env,
    pod_template, selector, service_port, tcp_port,
};

const COMPONENT: &str = "redis";

pub fn name(ctx: &RenderContext<'_>) -> String {
    ctx.object_name("redis")
}

fn image(ctx: &RenderContext<'_>) -> String {
    let overrides = &ctx.spec.redis.workload;
    image_ref(
        overrides.image.as_deref().unwrap_or(&ctx.images.redis_image),
        overrides.version.as_deref().unwrap_or(&ctx.images.redis_version),
    )
}

pub fn deployment(ctx: &RenderContext<'_>) -> Deployment {
    let name = name(ctx);
    let overrides = &ctx.spec.redis.workload;
    let container = Container {
        name: "redis".into(),
        image: Some(image(ctx)),
        args: Some(vec![
            "--save".into(),
            "".into(),
            "--appendonly".into(),
            "no".into(),
        ]),
        env: Some(merge_env(Vec::new(), &overrides.env)).filter(|e| !e.is_empty()),
        resources: overrides.resources.clone(),
        ports: Some(vec![tcp_port("redis", REDIS_PORT)]),
        ..Default::default()
    };
    Deployment {
        metadata: ctx.meta(&name, COMPONENT),
        spec: Some(DeploymentSpec {
            replicas: Some(overrides.replicas.unwrap_or(1)),
            selector: selector(ctx.selector_labels(&name)),
            template: pod_template(ctx.labels(&name, COMPONENT), container, None),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(ctx: &RenderContext<'_>) -> Service {
    let name = name(ctx);
    let mut metadata = ctx.meta(&name, COMPONENT);
    metadata.annotations =
        auto_tls_annotations(ctx.spec.redis.autotls.as_deref(), REDIS_TLS_SECRET);
    Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(ctx.selector_labels(&name)),
            ports: Some(vec![service_port("tcp-redis", REDIS_PORT, REDIS_PORT)]),
            type_: Some("ClusterIP".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
