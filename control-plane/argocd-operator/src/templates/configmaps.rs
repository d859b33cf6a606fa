use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use super::RenderContext;

pub const ARGOCD_CM: &str = "argocd-cm";
pub const ARGOCD_RBAC_CM: &str = "argocd-rbac-cm";

/// `argocd-cm`: a small set of defaults with `extraConfig` merged on top.
pub fn argocd_cm(ctx: &RenderContext<'_>) -> ConfigMap {
    let mut data = BTreeMap::from([
        ("admin.enabled".to_string(), "true".to_string()),
        (
            "application.instanceLabelKey".to_string(),
            "app.kubernetes.io/instance".to_string(),
        ),
        ("redis.server".to_string(), ctx.redis_address()),
        ("repo.server".to_string(), ctx.repo_server_address()),
    ]);
    if ctx.spec.redis.disable_tls_verification {
        data.insert("redis.tls.insecure".into(), "true".into());
    }
    for (k, v) in &ctx.spec.extra_config {
        data.insert(k.clone(), v.clone());
    }
    ConfigMap {
        metadata: ctx.meta(ARGOCD_CM, "config"),
        data: Some(data),
        ..Default::default()
    }
}

/// `argocd-rbac-cm`: policy keys are only rendered when set.
pub fn argocd_rbac_cm(ctx: &RenderContext<'_>) -> ConfigMap {
    let rbac = &ctx.spec.rbac;
    let data: BTreeMap<String, String> = [
        ("policy.csv", rbac.policy.as_ref()),
        ("policy.default", rbac.default_policy.as_ref()),
        ("scopes", rbac.scopes.as_ref()),
    ]
    .into_iter()
    .filter_map(|(k, v)| v.map(|v| (k.to_string(), v.clone())))
    .collect();
    ConfigMap {
        metadata: ctx.meta(ARGOCD_RBAC_CM, "config"),
        data: if data.is_empty() { None } else { Some(data) },
        ..Default::default()
    }
}
