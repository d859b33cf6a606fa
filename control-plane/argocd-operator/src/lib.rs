pub mod config;
pub mod controller;
pub mod crd;
pub mod runtime;
pub mod templates;
pub mod web;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(default_env: &str) {
    let default_directive = default_env
        .parse()
        .or_else(|_| "info".parse())
        .ok();
    let mut filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy();
    if let Some(directive) = default_directive {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
