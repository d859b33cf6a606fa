use argocd_operator::crd::argocd::ArgoCD;
use kube::core::CustomResourceExt;

fn main() {
    let crd = ArgoCD::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
