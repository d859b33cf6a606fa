pub mod argocd;
