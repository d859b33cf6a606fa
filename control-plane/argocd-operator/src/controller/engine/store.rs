use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::trace;

use crate::controller::ReconcileErr;

/// Any namespaced, statically typed object the engine can read and write.
pub trait Managed:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Managed for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Control-plane accessor.
///
/// Every method reports failures through three classes only:
/// [`ReconcileErr::NotFound`], [`ReconcileErr::Conflict`] and everything
/// else, which callers treat as transient. `update` is optimistic: the
/// object's `resourceVersion` must match the stored one.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the object is confirmed absent.
    async fn get<K: Managed>(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<K>, ReconcileErr>;

    /// Equality-based label selector (`k=v,k2=v2`); empty selects all.
    async fn list<K: Managed>(
        &self,
        ns: &str,
        label_selector: &str,
    ) -> Result<Vec<K>, ReconcileErr>;

    async fn create<K: Managed>(&self, obj: &K) -> Result<K, ReconcileErr>;

    async fn update<K: Managed>(&self, obj: &K) -> Result<K, ReconcileErr>;

    async fn delete<K: Managed>(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<(), ReconcileErr>;

    /// JSON merge patch applied to the status subresource only.
    async fn patch_status<K: Managed>(
        &self,
        ns: &str,
        name: &str,
        status_patch: &JsonValue,
    ) -> Result<(), ReconcileErr>;
}

pub(crate) fn object_key<K: Managed>(
    obj: &K,
) -> Result<(String, String), ReconcileErr> {
    let ns = obj.namespace().ok_or_else(|| {
        ReconcileErr::Internal(format!(
            "{} without namespace",
            K::kind(&())
        ))
    })?;
    let name = obj.meta().name.clone().ok_or_else(|| {
        ReconcileErr::Internal(format!("{} without name", K::kind(&())))
    })?;
    Ok((ns, name))
}

/// Accessor backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: String) -> Self {
        Self {
            client,
            field_manager,
        }
    }

    fn api<K: Managed>(&self, ns: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: Managed>(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<K>, ReconcileErr> {
        Ok(self.api::<K>(ns).get_opt(name).await?)
    }

    async fn list<K: Managed>(
        &self,
        ns: &str,
        label_selector: &str,
    ) -> Result<Vec<K>, ReconcileErr> {
        let mut lp = ListParams::default();
        if !label_selector.is_empty() {
            lp = lp.labels(label_selector);
        }
        Ok(self.api::<K>(ns).list(&lp).await?.items)
    }

    async fn create<K: Managed>(&self, obj: &K) -> Result<K, ReconcileErr> {
        let (ns, name) = object_key(obj)?;
        trace!(%ns, %name, kind = %K::kind(&()), "store: create");
        Ok(self.api::<K>(&ns).create(&self.post_params(), obj).await?)
    }

    async fn update<K: Managed>(&self, obj: &K) -> Result<K, ReconcileErr> {
        let (ns, name) = object_key(obj)?;
        trace!(%ns, %name, kind = %K::kind(&()), "store: replace");
        Ok(self
            .api::<K>(&ns)
            .replace(&name, &self.post_params(), obj)
            .await?)
    }

    async fn delete<K: Managed>(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<(), ReconcileErr> {
        trace!(%ns, %name, kind = %K::kind(&()), "store: delete");
        self.api::<K>(ns)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn patch_status<K: Managed>(
        &self,
        ns: &str,
        name: &str,
        status_patch: &JsonValue,
    ) -> Result<(), ReconcileErr> {
        let patch = json!({ "status": status_patch });
        let pp = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api::<K>(ns)
            .patch_status(name, &pp, &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
