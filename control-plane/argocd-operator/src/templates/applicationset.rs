use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::Container;

use super::{RenderContext, merge_env, pod_template, selector, tcp_port};

const COMPONENT: &str = "applicationset-controller";

pub fn name(ctx: &RenderContext<'_>) -> String {
    ctx.object_name("applicationset-controller")
}

pub fn deployment(ctx: &RenderContext<'_>) -> Deployment {
    let name = name(ctx);
    let overrides = &ctx.spec.application_set.workload;
    let container = Container {
        name: "argocd-applicationset-controller".into(),
        image: Some(ctx.argocd_image(overrides)),
        command: Some(vec![
            "entrypoint.sh".into(),
            "argocd-applicationset-controller".into(),
            "--argocd-repo-server".into(),
            ctx.repo_server_address(),
        ]),
        env: Some(merge_env(Vec::new(), &overrides.env)).filter(|e| !e.is_empty()),
        resources: overrides.resources.clone(),
        ports: Some(vec![tcp_port("webhook", 7000), tcp_port("metrics", 8080)]),
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
