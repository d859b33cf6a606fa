use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "argoproj.io",
    version = "v1beta1",
    kind = "ArgoCD",
    plural = "argocds",
    namespaced,
    status = "ArgoCDStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ArgoCDSpec {
    /// Container image used for every Argo CD component unless overridden
    pub image: Option<String>,
    /// Image tag used for every Argo CD component unless overridden
    pub version: Option<String>,
    #[serde(default)]
    pub controller: ControllerSpec,
    #[serde(default)]
    pub redis: RedisSpec,
    #[serde(default)]
    pub repo: RepoSpec,
    #[serde(default)]
    pub server: ServerSpec,
    #[serde(default)]
    pub application_set: ApplicationSetSpec,
    /// Extra keys merged into the argocd-cm ConfigMap
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_config: BTreeMap<String, String>,
    #[serde(default)]
    pub rbac: RbacSpec,
}

/// Overrides shared by every workload family.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadOverrides {
    /// Explicit enable flag; unset falls back to the family default
    pub enabled: Option<bool>,
    pub image: Option<String>,
    pub version: Option<String>,
    pub resources: Option<ResourceRequirements>,
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSpec {
    #[serde(flatten)]
    pub workload: WorkloadOverrides,
    #[serde(default)]
    pub sharding: ShardingSpec,
    /// Number of application status/operation processors
    pub processors: Option<ProcessorsSpec>,
    pub log_level: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShardingSpec {
    #[serde(default)]
    pub enabled: bool,
    /// Static replica count used when dynamic scaling is off
    pub replicas: Option<i32>,
    pub dynamic_scaling_enabled: Option<bool>,
    pub min_shards: Option<i32>,
    pub max_shards: Option<i32>,
    pub clusters_per_shard: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorsSpec {
    pub status: Option<i32>,
    pub operation: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RedisSpec {
    #[serde(flatten)]
    pub workload: WorkloadOverrides,
    /// Address of an externally managed redis; the local one is removed
    pub remote: Option<String>,
    #[serde(default, rename = "disableTLSVerification")]
    pub disable_tls_verification: bool,
    /// Certificate provider for the TLS secret; only "openshift" is known
    pub autotls: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepoSpec {
    #[serde(flatten)]
    pub workload: WorkloadOverrides,
    /// Address of an externally managed repo-server; the local one is removed
    pub remote: Option<String>,
    #[serde(default)]
    pub verifytls: bool,
    /// Certificate provider for the TLS secret; only "openshift" is known
    pub autotls: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    #[serde(flatten)]
    pub workload: WorkloadOverrides,
    #[serde(default)]
    pub autoscale: AutoscaleSpec,
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscaleSpec {
    #[serde(default)]
    pub enabled: bool,
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
    pub target_cpu_utilization_percentage: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSetSpec {
    #[serde(flatten)]
    pub workload: WorkloadOverrides,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RbacSpec {
    pub policy: Option<String>,
    pub default_policy: Option<String>,
    pub scopes: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArgoCDStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_set_controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    /// Content checksums of tracked secrets, keyed by tracking identifier
    /// (e.g. "redis-tls"). Owned by the rollout propagator.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checksums: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    Available,
    Reconciled,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl WorkloadOverrides {
    /// Resolve the enable tri-state against the family default.
    pub fn is_enabled(&self, family_default: bool) -> bool {
        self.enabled.unwrap_or(family_default)
    }
}

impl ArgoCDSpec {
    pub fn controller_enabled(&self) -> bool {
        self.controller.workload.is_enabled(true)
    }

    /// Local redis runs only when enabled and no remote redis is configured.
    pub fn redis_enabled(&self) -> bool {
        self.redis.workload.is_enabled(true) && self.redis.remote.is_none()
    }

    pub fn repo_enabled(&self) -> bool {
        self.repo.workload.is_enabled(true) && self.repo.remote.is_none()
    }

    pub fn server_enabled(&self) -> bool {
        self.server.workload.is_enabled(true)
    }

    pub fn server_autoscaled(&self) -> bool {
        self.server_enabled() && self.server.autoscale.enabled
    }

    pub fn application_set_enabled(&self) -> bool {
        self.application_set.workload.is_enabled(false)
    }
}

impl crate::controller::engine::rollout::ChecksumStatus for ArgoCD {
    fn checksum(&self, key: &str) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.checksums.get(key))
            .map(String::as_str)
    }
}
