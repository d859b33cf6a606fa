//! Desired-state providers: pure functions from an instance to fully formed
//! objects. They never read the cluster; everything they need is carried by
//! [`RenderContext`].

pub mod application_controller;
pub mod applicationset;
pub mod configmaps;
pub mod redis;
pub mod repo;
pub mod server;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ServicePort,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta, OwnerReference,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;

use crate::config::ImageConfig;
use crate::crd::argocd::{ArgoCD, ArgoCDSpec, WorkloadOverrides};

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// TLS material mounted by the components and watched for rotation.
pub const REDIS_TLS_SECRET: &str = "argocd-operator-redis-tls";
pub const REPO_TLS_SECRET: &str = "argocd-repo-server-tls";

pub const OPENSHIFT_SERVING_CERT: &str = "service.beta.openshift.io/serving-cert-secret-name";

/// Service annotations owned by the auto TLS setting.
pub const AUTO_TLS_ANNOTATIONS: &[&str] = &[OPENSHIFT_SERVING_CERT];

pub const REDIS_PORT: i32 = 6379;
pub const REPO_PORT: i32 = 8081;
pub const SERVER_PORT: i32 = 8080;

#[derive(Clone, Debug)]
pub struct RenderContext<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub spec: &'a ArgoCDSpec,
    /// Controller owner reference; `None` when the instance has no uid yet.
    pub owner: Option<OwnerReference>,
    pub images: &'a ImageConfig,
    /// Application controller replicas computed earlier in the pass.
    pub controller_replicas: i32,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        instance: &'a ArgoCD,
        namespace: &'a str,
        images: &'a ImageConfig,
        controller_replicas: i32,
    ) -> Self {
        Self {
            name: instance.meta().name.as_deref().unwrap_or_default(),
            namespace,
            spec: &instance.spec,
            owner: instance.controller_owner_ref(&()),
            images,
            controller_replicas,
        }
    }

    /// `<instance>-<suffix>`
    pub fn object_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name, suffix)
    }

    pub fn selector_labels(&self, object_name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_NAME.to_string(), object_name.to_string())])
    }

    pub fn labels(&self, object_name: &str, component: &str) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels(object_name);
        labels.insert(LABEL_PART_OF.into(), "argocd".into());
        labels.insert(LABEL_COMPONENT.into(), component.into());
        labels.insert(LABEL_MANAGED_BY.into(), "argocd-operator".into());
        labels
    }

    pub fn meta(&self, object_name: &str, component: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(object_name.to_string()),
            namespace: Some(self.namespace.to_string()),
            labels: Some(self.labels(object_name, component)),
            ..Default::default()
        }
    }

    /// Argo CD image, honouring per-family then instance-level overrides.
    pub fn argocd_image(&self, overrides: &WorkloadOverrides) -> String {
        let image = overrides
            .image
            .as_deref()
            .or(self.spec.image.as_deref())
            .unwrap_or(&self.images.argocd_image);
        let version = overrides
            .version
            .as_deref()
            .or(self.spec.version.as_deref())
            .unwrap_or(&self.images.argocd_version);
        image_ref(image, version)
    }

    pub fn redis_address(&self) -> String {
        match &self.spec.redis.remote {
            Some(remote) => remote.clone(),
            None => format!(
                "{}.{}.svc.cluster.local:{}",
                self.object_name("redis"),
                self.namespace,
                REDIS_PORT
            ),
        }
    }

    pub fn repo_server_address(&self) -> String {
        match &self.spec.repo.remote {
            Some(remote) => remote.clone(),
            None => format!(
                "{}.{}.svc.cluster.local:{}",
                self.object_name("repo-server"),
                self.namespace,
                REPO_PORT
            ),
        }
    }
}

/// `image:tag`, or `image@digest` when the version is a digest.
pub fn image_ref(image: &str, version: &str) -> String {
    if version.starts_with("sha256:") {
        format!("{image}@{version}")
    } else {
        format!("{image}:{version}")
    }
}

pub fn tcp_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.into()),
        container_port: port,
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

pub fn service_port(name: &str, port: i32, target: i32) -> ServicePort {
    ServicePort {
        name: Some(name.into()),
        port,
        target_port: Some(IntOrString::Int(target)),
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Rendered env first, then user-supplied entries (which win on duplicate
/// names by replacing the rendered value in place).
pub fn merge_env(mut rendered: Vec<EnvVar>, extra: &[EnvVar]) -> Vec<EnvVar> {
    for e in extra {
        match rendered.iter_mut().find(|r| r.name == e.name) {
            Some(slot) => *slot = e.clone(),
            None => rendered.push(e.clone()),
        }
    }
    rendered
}

/// Single-container pod template shared by every workload.
pub fn pod_template(
    labels: BTreeMap<String, String>,
    container: Container,
    volumes: Option<Vec<Volume>>,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            volumes,
            ..Default::default()
        }),
    }
}

/// Optional secret volume; mode 420 (0644) matches the API-server default.
pub fn tls_volume(volume_name: &str, secret_name: &str) -> Volume {
    Volume {
        name: volume_name.into(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.into()),
            optional: Some(true),
            default_mode: Some(420),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Service annotations asking the platform to issue `secret_name`.
pub fn auto_tls_annotations(
    autotls: Option<&str>,
    secret_name: &str,
) -> Option<BTreeMap<String, String>> {
    match autotls {
        Some(provider) if provider.eq_ignore_ascii_case("openshift") => Some(BTreeMap::from([(
            OPENSHIFT_SERVING_CERT.to_string(),
            secret_name.to_string(),
        )])),
        _ => None,
    }
}

pub fn tls_mount(volume_name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: volume_name.into(),
        mount_path: path.into(),
        read_only: Some(true),
        ..Default::default()
    }
}

pub fn selector(labels: BTreeMap<String, String>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::argocd::ArgoCDSpec;

    fn instance() -> ArgoCD {
        let mut a = ArgoCD::new("example", ArgoCDSpec::default());
        a.metadata.namespace = Some("argocd".into());
        a
    }

    #[test]
    fn image_resolution_prefers_family_then_instance_then_defaults() {
        let images = ImageConfig::default();
        let mut a = instance();
        let ctx = RenderContext::new(&a, "argocd", &images, 1);
        assert_eq!(
            ctx.argocd_image(&WorkloadOverrides::default()),
            "quay.io/argoproj/argocd:v2.13.1"
        );

        a.spec.version = Some("v2.12.0".into());
        let ctx = RenderContext::new(&a, "argocd", &images, 1);
        let family = WorkloadOverrides {
            image: Some("mirror/argocd".into()),
            ..Default::default()
        };
        assert_eq!(ctx.argocd_image(&family), "mirror/argocd:v2.12.0");
    }

    #[test]
    fn auto_tls_only_for_openshift() {
        assert!(auto_tls_annotations(None, "s").is_none());
        assert!(auto_tls_annotations(Some("cert-manager"), "s").is_none());
        let annotations = auto_tls_annotations(Some("OpenShift"), "s").unwrap();
        assert_eq!(annotations[OPENSHIFT_SERVING_CERT], "s");
    }

    #[test]
    fn digest_versions_use_at_sign() {
        assert_eq!(image_ref("img", "sha256:abc"), "img@sha256:abc");
    }

    #[test]
    fn owner_is_absent_without_uid() {
        let images = ImageConfig::default();
        let mut a = instance();
        assert!(RenderContext::new(&a, "argocd", &images, 1).owner.is_none());
        a.metadata.uid = Some("u1".into());
        let owner = RenderContext::new(&a, "argocd", &images, 1).owner.unwrap();
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.kind, "ArgoCD");
    }

    #[test]
    fn user_env_overrides_rendered_env() {
        let merged = merge_env(
            vec![env("A", "1"), env("B", "2")],
            &[env("B", "x"), env("C", "3")],
        );
        let names: Vec<_> = merged.iter().map(|e| (e.name.as_str(), e.value.as_deref())).collect();
        assert_eq!(names, vec![("A", Some("1")), ("B", Some("x")), ("C", Some("3"))]);
    }
}
