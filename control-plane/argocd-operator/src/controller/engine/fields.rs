//! Per-kind field-group tables. Each table lists exactly the fields this
//! operator manages for a kind; anything else on the live object (status,
//! API-server defaults, fields owned by other controllers) is never compared.

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler,
    HorizontalPodAutoscalerSpec, MetricSpec,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, ResourceRequirements,
    Service, ServicePort, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::diff::FieldGroup;
use super::store::Managed;
use super::workload::PodWorkload;

type Labels = BTreeMap<String, String>;

fn non_empty(map: Labels) -> Option<Labels> {
    if map.is_empty() { None } else { Some(map) }
}

/// Object labels and annotations. An unset map and an empty map compare
/// equal.
pub fn metadata_groups<K: Managed>() -> Vec<FieldGroup<K>> {
    vec![
        FieldGroup::strict(
            "metadata.labels",
            |o: &K| o.labels().clone(),
            |o: &mut K, v| o.meta_mut().labels = non_empty(v),
        ),
        FieldGroup::strict(
            "metadata.annotations",
            |o: &K| o.annotations().clone(),
            |o: &mut K, v| o.meta_mut().annotations = non_empty(v),
        ),
    ]
}

pub fn config_map_groups() -> Vec<FieldGroup<ConfigMap>> {
    let mut groups = metadata_groups::<ConfigMap>();
    groups.push(FieldGroup::strict(
        "data",
        |c: &ConfigMap| c.data.clone().unwrap_or_default(),
        |c: &mut ConfigMap, v| c.data = non_empty(v),
    ));
    groups
}

#[derive(Clone, Debug, PartialEq)]
struct PortView {
    name: Option<String>,
    port: i32,
    target_port: Option<String>,
    protocol: Option<String>,
}

fn service_ports(s: &Service) -> Vec<PortView> {
    s.spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|p| PortView {
                    name: p.name.clone(),
                    port: p.port,
                    target_port: p.target_port.as_ref().map(|t| match t {
                        IntOrString::Int(i) => i.to_string(),
                        IntOrString::String(s) => s.clone(),
                    }),
                    protocol: p.protocol.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Copy desired ports, keeping node ports allocated by the API server.
fn copy_service_ports(existing: &mut Service, desired: &Service) {
    let desired_ports: Vec<ServicePort> = desired
        .spec
        .as_ref()
        .and_then(|s| s.ports.clone())
        .unwrap_or_default();
    let live = existing.spec.get_or_insert_with(Default::default);
    let previous = live.ports.take().unwrap_or_default();
    let merged = desired_ports
        .into_iter()
        .map(|mut p| {
            if p.node_port.is_none() {
                p.node_port = previous
                    .iter()
                    .find(|old| old.name == p.name && old.port == p.port)
                    .and_then(|old| old.node_port);
            }
            p
        })
        .collect::<Vec<_>>();
    live.ports = if merged.is_empty() { None } else { Some(merged) };
}

pub fn service_groups() -> Vec<FieldGroup<Service>> {
    let mut groups = metadata_groups::<Service>();
    groups.push(FieldGroup::strict(
        "spec.selector",
        |s: &Service| {
            s.spec
                .as_ref()
                .and_then(|spec| spec.selector.clone())
                .unwrap_or_default()
        },
        |s: &mut Service, v| {
            s.spec.get_or_insert_with(Default::default).selector = non_empty(v)
        },
    ));
    groups.push(FieldGroup::new(
        "spec.ports",
        |existing: &Service, desired: &Service| {
            service_ports(existing) != service_ports(desired)
        },
        copy_service_ports,
    ));
    groups.push(FieldGroup::optional(
        "spec.type",
        |s: &Service| s.spec.as_ref().and_then(|spec| spec.type_.clone()),
        |s: &mut Service, v| {
            s.spec.get_or_insert_with(Default::default).type_ = Some(v)
        },
    ));
    groups
}

/// Projection of the container fields this operator renders.
#[derive(Clone, Debug, PartialEq)]
struct ContainerView {
    name: String,
    image: Option<String>,
    command: Vec<String>,
    args: Vec<String>,
    env: Vec<EnvVar>,
    resources: Option<ResourceRequirements>,
    volume_mounts: Vec<VolumeMount>,
    ports: Vec<ContainerPort>,
}

impl From<&Container> for ContainerView {
    fn from(c: &Container) -> Self {
        Self {
            name: c.name.clone(),
            image: c.image.clone(),
            command: c.command.clone().unwrap_or_default(),
            args: c.args.clone().unwrap_or_default(),
            env: c.env.clone().unwrap_or_default(),
            resources: c
                .resources
                .clone()
                .filter(|r| *r != ResourceRequirements::default()),
            volume_mounts: c.volume_mounts.clone().unwrap_or_default(),
            ports: c.ports.clone().unwrap_or_default(),
        }
    }
}

fn container_views<W: PodWorkload>(w: &W) -> Vec<ContainerView> {
    w.pod_spec()
        .map(|p| p.containers.iter().map(ContainerView::from).collect())
        .unwrap_or_default()
}

/// Same container names in the same order: update the managed fields in
/// place so API-server defaults on each container survive. Otherwise the
/// container list is replaced.
fn copy_containers<W: PodWorkload>(existing: &mut W, desired: &W) {
    let wanted: Vec<Container> = desired
        .pod_spec()
        .map(|p| p.containers.clone())
        .unwrap_or_default();
    let live = &mut existing.pod_spec_mut().containers;
    let same_shape = live.len() == wanted.len()
        && live.iter().zip(&wanted).all(|(l, w)| l.name == w.name);
    if !same_shape {
        *live = wanted;
        return;
    }
    for (l, w) in live.iter_mut().zip(wanted) {
        l.image = w.image;
        l.command = w.command;
        l.args = w.args;
        l.env = w.env;
        l.resources = w.resources;
        l.volume_mounts = w.volume_mounts;
        l.ports = w.ports;
    }
}

/// Groups shared by Deployment and StatefulSet.
pub fn workload_groups<W: PodWorkload>() -> Vec<FieldGroup<W>> {
    let mut groups = metadata_groups::<W>();
    groups.extend([
        FieldGroup::optional(
            "spec.replicas",
            |w: &W| w.replicas(),
            |w: &mut W, v| w.set_replicas(Some(v)),
        ),
        FieldGroup::strict(
            "spec.template.metadata.labels",
            |w: &W| w.template_labels(),
            |w: &mut W, v| w.template_meta_mut().labels = non_empty(v),
        ),
        FieldGroup::strict(
            "spec.template.metadata.annotations",
            |w: &W| w.template_annotations(),
            |w: &mut W, v| w.template_meta_mut().annotations = non_empty(v),
        ),
        FieldGroup::new(
            "spec.template.spec.containers",
            |existing: &W, desired: &W| {
                container_views(existing) != container_views(desired)
            },
            copy_containers::<W>,
        ),
        FieldGroup::strict(
            "spec.template.spec.volumes",
            |w: &W| -> Vec<Volume> {
                w.pod_spec()
                    .and_then(|p| p.volumes.clone())
                    .unwrap_or_default()
            },
            |w: &mut W, v| {
                w.pod_spec_mut().volumes =
                    if v.is_empty() { None } else { Some(v) }
            },
        ),
        FieldGroup::optional(
            "spec.template.spec.serviceAccountName",
            |w: &W| w.pod_spec().and_then(|p| p.service_account_name.clone()),
            |w: &mut W, v| w.pod_spec_mut().service_account_name = Some(v),
        ),
        FieldGroup::optional(
            "spec.template.spec.nodeSelector",
            |w: &W| w.pod_spec().and_then(|p| p.node_selector.clone()),
            |w: &mut W, v| w.pod_spec_mut().node_selector = Some(v),
        ),
        FieldGroup::optional(
            "spec.template.spec.tolerations",
            |w: &W| -> Option<Vec<Toleration>> {
                w.pod_spec().and_then(|p| p.tolerations.clone())
            },
            |w: &mut W, v| w.pod_spec_mut().tolerations = Some(v),
        ),
    ]);
    groups
}

#[derive(Clone, Debug, PartialEq)]
struct HpaView {
    min_replicas: Option<i32>,
    max_replicas: i32,
    target: CrossVersionObjectReference,
    metrics: Vec<MetricSpec>,
}

fn hpa_view(h: &HorizontalPodAutoscaler) -> Option<HpaView> {
    h.spec.as_ref().map(|s| HpaView {
        min_replicas: s.min_replicas,
        max_replicas: s.max_replicas,
        target: s.scale_target_ref.clone(),
        metrics: s.metrics.clone().unwrap_or_default(),
    })
}

pub fn hpa_groups() -> Vec<FieldGroup<HorizontalPodAutoscaler>> {
    let mut groups = metadata_groups::<HorizontalPodAutoscaler>();
    groups.push(FieldGroup::new(
        "spec",
        |existing: &HorizontalPodAutoscaler, desired: &HorizontalPodAutoscaler| {
            hpa_view(existing) != hpa_view(desired)
        },
        |existing: &mut HorizontalPodAutoscaler,
         desired: &HorizontalPodAutoscaler| {
            let Some(want) = desired.spec.as_ref() else {
                return;
            };
            let live: &mut HorizontalPodAutoscalerSpec =
                existing.spec.get_or_insert_with(Default::default);
            live.min_replicas = want.min_replicas;
            live.max_replicas = want.max_replicas;
            live.scale_target_ref = want.scale_target_ref.clone();
            live.metrics = want.metrics.clone();
        },
    ));
    groups
}

/// Append an extra action to the group called `name`.
pub fn with_extra_on<K: 'static>(
    groups: Vec<FieldGroup<K>>,
    name: &str,
    extra: impl Fn(&mut K) + Send + Sync + Clone + 'static,
) -> Vec<FieldGroup<K>> {
    groups
        .into_iter()
        .map(|g| {
            if g.name() == name {
                g.with_extra(extra.clone())
            } else {
                g
            }
        })
        .collect()
}
