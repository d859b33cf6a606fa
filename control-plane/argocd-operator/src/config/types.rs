use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when unset.
    /// Env: ARGOCD_OPERATOR_WATCH_NAMESPACE
    #[envconfig(from = "ARGOCD_OPERATOR_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    #[envconfig(from = "HTTP_PORT", default = "8080")]
    pub http_port: u16,

    /// Periodic resync interval after a successful pass.
    #[envconfig(from = "ARGOCD_OPERATOR_RESYNC_SECS", default = "180")]
    pub resync_secs: u64,

    /// Delay before re-reading after an optimistic-concurrency conflict.
    #[envconfig(from = "ARGOCD_OPERATOR_CONFLICT_REQUEUE_MS", default = "500")]
    pub conflict_requeue_ms: u64,

    #[envconfig(from = "ARGOCD_OPERATOR_ERROR_REQUEUE_SECS", default = "30")]
    pub error_requeue_secs: u64,

    /// Reported as the event source and used as the field manager on writes.
    #[envconfig(from = "ARGOCD_OPERATOR_FIELD_MANAGER", default = "argocd-operator")]
    pub field_manager: String,

    #[envconfig(nested)]
    pub images: ImageConfig,
}

/// Image defaults used when an instance leaves image/version unset.
#[derive(Envconfig, Clone, Debug)]
pub struct ImageConfig {
    #[envconfig(from = "ARGOCD_IMAGE", default = "quay.io/argoproj/argocd")]
    pub argocd_image: String,
    #[envconfig(from = "ARGOCD_VERSION", default = "v2.13.1")]
    pub argocd_version: String,
    #[envconfig(from = "REDIS_IMAGE", default = "redis")]
    pub redis_image: String,
    #[envconfig(from = "REDIS_VERSION", default = "7.0.15-alpine")]
    pub redis_version: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            argocd_image: "quay.io/argoproj/argocd".into(),
            argocd_version: "v2.13.1".into(),
            redis_image: "redis".into(),
            redis_version: "7.0.15-alpine".into(),
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            http_port: 8080,
            resync_secs: 180,
            conflict_requeue_ms: 500,
            error_requeue_secs: 30,
            field_manager: "argocd-operator".into(),
            images: ImageConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Drop empty values that envconfig passes through verbatim.
    pub fn normalize(mut self) -> Self {
        if self
            .watch_namespace
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(false)
        {
            self.watch_namespace = None;
        }
        if self.resync_secs == 0 {
            self.resync_secs = 180;
        }
        if self.field_manager.trim().is_empty() {
            self.field_manager = "argocd-operator".into();
        }
        self
    }
}
