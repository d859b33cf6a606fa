#![allow(dead_code)]

use std::collections::BTreeMap;

use argocd_operator::config::ImageConfig;
use argocd_operator::controller::ReconcileErr;
use argocd_operator::controller::engine::ObjectStore;
use argocd_operator::controller::engine::clock::StepClock;
use argocd_operator::controller::engine::memory::MemoryStore;
use argocd_operator::controller::engine::workload::PodWorkload;
use argocd_operator::controller::plan::Plan;
use argocd_operator::controller::reconcile::{PassReport, run_pass};
use argocd_operator::crd::argocd::{ArgoCD, ArgoCDSpec};
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Secret;

pub const NS: &str = "argocd";
pub const NAME: &str = "example";

pub struct Harness {
    pub store: MemoryStore,
    pub clock: StepClock,
    pub images: ImageConfig,
    pub plan: Plan,
}

impl Harness {
    pub async fn new(spec: ArgoCDSpec) -> Self {
        let store = MemoryStore::new();
        let mut instance = ArgoCD::new(NAME, spec);
        instance.metadata.namespace = Some(NS.into());
        store.seed(&instance).await.expect("seed instance");
        Self {
            store,
            clock: StepClock::starting_at(1_700_000_000),
            images: ImageConfig::default(),
            plan: Plan::standard().expect("standard plan"),
        }
    }

    pub async fn instance(&self) -> ArgoCD {
        self.store
            .get(NS, NAME)
            .await
            .expect("get instance")
            .expect("instance exists")
    }

    /// One pass against the latest stored instance.
    pub async fn pass(&self) -> Result<PassReport, ReconcileErr> {
        let instance = self.instance().await;
        run_pass(&self.store, &self.clock, &self.images, &self.plan, &instance).await
    }

    pub async fn edit_spec(&self, f: impl FnOnce(&mut ArgoCDSpec)) {
        self.store
            .mutate::<ArgoCD, _>(NS, NAME, |a| f(&mut a.spec))
            .await
            .expect("edit spec");
    }

    pub async fn deployment(&self, name: &str) -> Option<Deployment> {
        self.store.get(NS, name).await.expect("get deployment")
    }

    pub async fn statefulset(&self, name: &str) -> Option<StatefulSet> {
        self.store.get(NS, name).await.expect("get statefulset")
    }

    pub async fn checksum(&self, key: &str) -> Option<String> {
        self.instance()
            .await
            .status
            .and_then(|s| s.checksums.get(key).cloned())
    }

    /// Labels on the three TLS dependents, in a fixed order.
    pub async fn rollout_labels(&self, key: &str) -> Vec<Option<String>> {
        let server = self.deployment("example-server").await.expect("server");
        let repo = self.deployment("example-repo-server").await.expect("repo");
        let controller = self
            .statefulset("example-application-controller")
            .await
            .expect("controller");
        vec![
            server.template_label(key),
            repo.template_label(key),
            controller.template_label(key),
        ]
    }

    pub async fn put_tls_secret(&self, name: &str, cert: &str, key: &str) {
        let mut s = Secret::default();
        s.metadata.name = Some(name.into());
        s.metadata.namespace = Some(NS.into());
        s.data = Some(BTreeMap::from([
            ("tls.crt".to_string(), ByteString(cert.as_bytes().to_vec())),
            ("tls.key".to_string(), ByteString(key.as_bytes().to_vec())),
        ]));
        self.store.seed(&s).await.expect("seed secret");
    }

    pub async fn add_cluster_secrets(&self, from: usize, count: usize) {
        for i in from..from + count {
            let mut s = Secret::default();
            s.metadata.name = Some(format!("cluster-{i}"));
            s.metadata.namespace = Some(NS.into());
            s.metadata.labels = Some(BTreeMap::from([(
                "argocd.argoproj.io/secret-type".to_string(),
                "cluster".to_string(),
            )]));
            self.store.seed(&s).await.expect("seed cluster secret");
        }
    }

    /// Simulate the workload controllers reporting every replica ready.
    pub async fn mark_ready(&self) {
        for name in ["example-redis", "example-repo-server", "example-server"] {
            self.store
                .mutate::<Deployment, _>(NS, name, |d| {
                    let want = d.replicas().unwrap_or(1);
                    d.status.get_or_insert_with(Default::default).ready_replicas = Some(want);
                })
                .await
                .expect("mark deployment ready");
        }
        self.store
            .mutate::<StatefulSet, _>(NS, "example-application-controller", |s| {
                let want = s.replicas().unwrap_or(1);
                s.status.get_or_insert_with(Default::default).ready_replicas = Some(want);
            })
            .await
            .expect("mark statefulset ready");
    }
}
