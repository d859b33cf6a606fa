use std::net::SocketAddr;

use axum::{Router, routing::get};
use tracing::info;

pub fn router() -> Router {
    // /health is preferred; /healthz kept for probes that expect it
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/healthz", get(|| async { "ok" }))
}

pub async fn run_http_server(addr: SocketAddr) -> anyhow::Result<()> {
    info!("argocd-operator HTTP listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router()).await?;
    Ok(())
}
