#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, Container, Service, ServicePort, ServiceSpec};

    use super::super::diff::{FieldGroup, diff};
    use super::super::fields;
    use super::super::workload::PodWorkload;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn deployment(image: &str, replicas: Option<i32>) -> Deployment {
        let mut d = Deployment::default();
        d.metadata.name = Some("web".into());
        d.metadata.namespace = Some("ns".into());
        d.metadata.labels = Some(map(&[("app", "web")]));
        d.set_replicas(replicas);
        d.set_template_label("app", "web".into());
        d.pod_spec_mut().containers = vec![Container {
            name: "web".into(),
            image: Some(image.into()),
            ..Default::default()
        }];
        d
    }

    #[test]
    fn identical_objects_are_a_fixed_point() {
        let desired = deployment("img:1", Some(2));
        let mut existing = desired.clone();
        let out = diff(&mut existing, &desired, &fields::workload_groups());
        assert!(!out.changed);
        assert!(out.explanation.is_empty());
    }

    #[test]
    fn only_differing_groups_are_copied_and_explained() {
        let desired = deployment("img:2", Some(2));
        let mut existing = deployment("img:1", Some(2));
        existing.metadata.resource_version = Some("7".into());

        let out = diff(&mut existing, &desired, &fields::workload_groups());
        assert!(out.changed);
        assert_eq!(out.explanation, vec!["spec.template.spec.containers changed"]);
        assert_eq!(
            existing.pod_spec().unwrap().containers[0].image.as_deref(),
            Some("img:2")
        );
        // Not an object replacement.
        assert_eq!(existing.metadata.resource_version.as_deref(), Some("7"));

        let again = diff(&mut existing, &desired, &fields::workload_groups());
        assert!(!again.changed);
    }

    #[test]
    fn unmanaged_optional_field_is_left_alone() {
        let desired = deployment("img:1", None);
        let mut existing = deployment("img:1", Some(5));
        let out = diff(&mut existing, &desired, &fields::workload_groups());
        assert!(!out.changed);
        assert_eq!(existing.replicas(), Some(5));
    }

    #[test]
    fn container_defaults_from_the_server_survive_an_image_change() {
        let desired = deployment("img:2", Some(1));
        let mut existing = deployment("img:1", Some(1));
        existing.pod_spec_mut().containers[0].termination_message_path =
            Some("/dev/termination-log".into());

        diff(&mut existing, &desired, &fields::workload_groups());
        let c = &existing.pod_spec().unwrap().containers[0];
        assert_eq!(c.image.as_deref(), Some("img:2"));
        assert_eq!(c.termination_message_path.as_deref(), Some("/dev/termination-log"));
    }

    #[test]
    fn renamed_container_replaces_the_list() {
        let mut desired = deployment("img:1", Some(1));
        desired.pod_spec_mut().containers[0].name = "server".into();
        let mut existing = deployment("img:1", Some(1));
        let out = diff(&mut existing, &desired, &fields::workload_groups());
        assert!(out.changed);
        assert_eq!(existing.pod_spec().unwrap().containers[0].name, "server");
    }

    #[test]
    fn strict_group_clears_to_explicit_emptiness() {
        let mut desired = ConfigMap::default();
        desired.data = None;
        let mut existing = ConfigMap::default();
        existing.data = Some(map(&[("stale", "1")]));

        let out = diff(&mut existing, &desired, &fields::config_map_groups());
        assert_eq!(out.explanation, vec!["data changed"]);
        assert_eq!(existing.data, None);
    }

    #[test]
    fn empty_and_unset_label_maps_compare_equal() {
        let desired = ConfigMap::default();
        let mut existing = ConfigMap::default();
        existing.metadata.labels = Some(BTreeMap::new());
        let out = diff(&mut existing, &desired, &fields::config_map_groups());
        assert!(!out.changed);
    }

    #[test]
    fn extra_action_runs_once_per_differing_group() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let groups = vec![
            FieldGroup::strict(
                "data",
                |c: &ConfigMap| c.data.clone().unwrap_or_default(),
                |c: &mut ConfigMap, v| c.data = Some(v),
            )
            .with_extra(move |c: &mut ConfigMap| {
                seen.fetch_add(1, Ordering::SeqCst);
                c.metadata
                    .annotations
                    .get_or_insert_with(BTreeMap::new)
                    .insert("touched".into(), "yes".into());
            }),
            FieldGroup::strict(
                "binaryData",
                |c: &ConfigMap| c.binary_data.clone().unwrap_or_default(),
                |c: &mut ConfigMap, v| c.binary_data = Some(v),
            ),
        ];
        let mut desired = ConfigMap::default();
        desired.data = Some(map(&[("k", "v")]));
        let mut existing = ConfigMap::default();

        let out = diff(&mut existing, &desired, &groups);
        assert_eq!(out.explanation, vec!["data changed"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            existing.metadata.annotations.unwrap().get("touched").map(String::as_str),
            Some("yes")
        );

        let mut existing = ConfigMap {
            data: desired.data.clone(),
            ..Default::default()
        };
        let out = diff(&mut existing, &desired, &groups);
        assert!(!out.changed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn service_ports_keep_allocated_node_ports() {
        let port = |node_port: Option<i32>| ServicePort {
            name: Some("http".into()),
            port: 80,
            protocol: Some("TCP".into()),
            node_port,
            ..Default::default()
        };
        let mut desired = Service::default();
        desired.spec = Some(ServiceSpec {
            ports: Some(vec![ServicePort { port: 80, ..port(None) }]),
            type_: Some("NodePort".into()),
            ..Default::default()
        });
        let mut existing = Service::default();
        existing.spec = Some(ServiceSpec {
            ports: Some(vec![ServicePort { port: 8080, ..port(Some(30080)) }]),
            type_: Some("NodePort".into()),
            ..Default::default()
        });
        // Different port number forces a copy; node port of a different
        // port is not reused.
        diff(&mut existing, &desired, &fields::service_groups());
        let ports = existing.spec.as_ref().unwrap().ports.clone().unwrap();
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[0].node_port, None);

        let mut existing = Service::default();
        existing.spec = Some(ServiceSpec {
            ports: Some(vec![ServicePort { protocol: None, ..port(Some(30080)) }]),
            ..Default::default()
        });
        let out = diff(&mut existing, &desired, &fields::service_groups());
        assert!(out.changed);
        let ports = existing.spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].node_port, Some(30080));
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
    }
}
