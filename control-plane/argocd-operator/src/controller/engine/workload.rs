use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::store::Managed;

/// Kinds that carry a pod template and can be restarted by touching it.
pub trait PodWorkload: Managed {
    fn replicas(&self) -> Option<i32>;
    fn set_replicas(&mut self, replicas: Option<i32>);
    fn template(&self) -> Option<&PodTemplateSpec>;
    fn template_mut(&mut self) -> &mut PodTemplateSpec;
    /// Replicas reported ready by the workload controller.
    fn ready_replicas(&self) -> i32;

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.template().and_then(|t| t.spec.as_ref())
    }

    fn pod_spec_mut(&mut self) -> &mut PodSpec {
        self.template_mut().spec.get_or_insert_with(Default::default)
    }

    fn template_meta_mut(&mut self) -> &mut ObjectMeta {
        self.template_mut()
            .metadata
            .get_or_insert_with(Default::default)
    }

    fn template_labels(&self) -> BTreeMap<String, String> {
        self.template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.labels.clone())
            .unwrap_or_default()
    }

    fn template_annotations(&self) -> BTreeMap<String, String> {
        self.template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.annotations.clone())
            .unwrap_or_default()
    }

    fn template_label(&self, key: &str) -> Option<String> {
        self.template_labels().get(key).cloned()
    }

    fn set_template_label(&mut self, key: &str, value: String) {
        self.template_meta_mut()
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
    }
}

fn deployment_spec_mut(d: &mut Deployment) -> &mut DeploymentSpec {
    d.spec.get_or_insert_with(Default::default)
}

fn statefulset_spec_mut(s: &mut StatefulSet) -> &mut StatefulSetSpec {
    s.spec.get_or_insert_with(Default::default)
}

impl PodWorkload for Deployment {
    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }

    fn set_replicas(&mut self, replicas: Option<i32>) {
        deployment_spec_mut(self).replicas = replicas;
    }

    fn template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }

    fn template_mut(&mut self) -> &mut PodTemplateSpec {
        &mut deployment_spec_mut(self).template
    }

    fn ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0)
    }
}

impl PodWorkload for StatefulSet {
    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }

    fn set_replicas(&mut self, replicas: Option<i32>) {
        statefulset_spec_mut(self).replicas = replicas;
    }

    fn template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }

    fn template_mut(&mut self) -> &mut PodTemplateSpec {
        &mut statefulset_spec_mut(self).template
    }

    fn ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0)
    }
}
