// Integration tests that expect a running k8s cluster with the ArgoCD CRD installed
// (`cargo run --bin crdgen | kubectl apply -f -`).
// Enable via: cargo test -p argocd-operator --test it_k8s -- --ignored

use argocd_operator::config::ImageConfig;
use argocd_operator::controller::engine::clock::SystemClock;
use argocd_operator::controller::engine::{KubeStore, ObjectStore, Outcome};
use argocd_operator::controller::plan::{Component, Plan};
use argocd_operator::controller::reconcile::run_pass;
use argocd_operator::crd::argocd::{ArgoCD, ArgoCDSpec};
use k8s_openapi::api::apps::v1::Deployment;
use kube::Client;
use kube::api::{Api, DeleteParams, PostParams};

const DIGITS: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

#[test_log::test(tokio::test)]
#[ignore]
async fn pass_converges_against_live_cluster() {
    // Pre-conditions:
    // - KUBECONFIG points to a working cluster
    // - ArgoCD CRD installed
    // - Namespace "default" exists
    let client = Client::try_default().await.expect("kube client");
    let ns = "default";
    let name = uniq("argocd-it");

    let api: Api<ArgoCD> = Api::namespaced(client.clone(), ns);
    let created = api
        .create(&PostParams::default(), &ArgoCD::new(&name, ArgoCDSpec::default()))
        .await
        .expect("create instance");

    let store = KubeStore::new(client.clone(), "argocd-operator-it".into());
    let plan = Plan::standard().expect("plan");
    let images = ImageConfig::default();

    let first = run_pass(&store, &SystemClock, &images, &plan, &created)
        .await
        .expect("first pass");
    assert_eq!(first.outcome(Component::ServerDeployment), Some(&Outcome::Created));

    let latest = api.get(&name).await.expect("re-read instance");
    let second = run_pass(&store, &SystemClock, &images, &plan, &latest)
        .await
        .expect("second pass");
    assert_eq!(second.changed_objects(), 0, "{:?}", second.outcomes);

    let server: Option<Deployment> = store
        .get(ns, &format!("{name}-server"))
        .await
        .expect("get server");
    assert!(server.is_some());

    // Owner references let the garbage collector remove the children.
    let _ = api.delete(&name, &DeleteParams::background()).await;
}
