use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::field::Empty;
use tracing::{debug, info, instrument, warn};

use super::diff::{FieldGroup, diff};
use super::metadata;
use super::prober::probe;
use super::store::{Managed, ObjectStore, object_key};
use super::workload::PodWorkload;
use crate::controller::ReconcileErr;

/// What the lifecycle controller does for one `(enabled, exists)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Create,
    /// Preserve external metadata, diff and update when changed.
    Reconcile,
    Delete,
    Noop,
}

pub fn decide(enabled: bool, exists: bool) -> Transition {
    match (enabled, exists) {
        (true, false) => Transition::Create,
        (true, true) => Transition::Reconcile,
        (false, true) => Transition::Delete,
        (false, false) => Transition::Noop,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// Explanation of the differing field groups.
    Updated(Vec<String>),
    Unchanged,
    Deleted,
    /// Disabled and not present.
    Absent,
}

impl Outcome {
    pub fn wrote(&self) -> bool {
        matches!(
            self,
            Outcome::Created | Outcome::Updated(_) | Outcome::Deleted
        )
    }
}

type Preserve<K> = fn(&mut K, &K);

/// Everything the lifecycle controller needs for one managed object.
pub struct ObjectStep<K> {
    pub desired: K,
    pub enabled: bool,
    pub groups: Vec<FieldGroup<K>>,
    /// Owner reference for created objects; `None` when it could not be
    /// derived.
    pub owner: Option<OwnerReference>,
    preserve: Preserve<K>,
    owned_annotations: &'static [&'static str],
}

impl<K: Managed> ObjectStep<K> {
    pub fn new(
        desired: K,
        enabled: bool,
        groups: Vec<FieldGroup<K>>,
        owner: Option<OwnerReference>,
    ) -> Self {
        Self {
            desired,
            enabled,
            groups,
            owner,
            preserve: metadata::preserve_object::<K>,
            owned_annotations: &[],
        }
    }

    /// Annotation keys this operator sets itself. When the desired object
    /// omits one, it is removed from the live object instead of being
    /// preserved as external metadata.
    pub fn with_owned_annotations(mut self, keys: &'static [&'static str]) -> Self {
        self.owned_annotations = keys;
        self
    }
}

impl<K: PodWorkload> ObjectStep<K> {
    /// Also preserve pod-template labels and annotations.
    pub fn workload(
        desired: K,
        enabled: bool,
        groups: Vec<FieldGroup<K>>,
        owner: Option<OwnerReference>,
    ) -> Self {
        Self {
            preserve: metadata::preserve_workload::<K>,
            ..Self::new(desired, enabled, groups, owner)
        }
    }
}

fn attach_owner<K: Managed>(obj: &mut K, owner: OwnerReference) {
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if !refs.iter().any(|r| r.uid == owner.uid) {
        refs.push(owner);
    }
}

/// Drive one object to its desired state with at most one write.
#[instrument(skip_all, fields(kind = %K::kind(&()), ns = Empty, name = Empty))]
pub async fn reconcile_object<K, S>(
    store: &S,
    step: ObjectStep<K>,
) -> Result<Outcome, ReconcileErr>
where
    K: Managed,
    S: ObjectStore,
{
    let (ns, name) = object_key(&step.desired)?;
    tracing::Span::current()
        .record("ns", ns.as_str())
        .record("name", name.as_str());

    let existing = probe::<K, S>(store, &ns, &name).await?;
    match (decide(step.enabled, existing.is_some()), existing) {
        (Transition::Create, _) => {
            let mut desired = step.desired;
            match step.owner {
                Some(owner) => attach_owner(&mut desired, owner),
                None => warn!("no owner reference; creating unowned object"),
            }
            match store.create(&desired).await {
                Ok(_) => {
                    info!("created");
                    Ok(Outcome::Created)
                }
                Err(ReconcileErr::Conflict(msg)) => {
                    debug!(%msg, "already exists; treating create as done");
                    Ok(Outcome::Unchanged)
                }
                Err(e) => Err(e),
            }
        }
        (Transition::Reconcile, Some(mut existing)) => {
            let mut desired = step.desired;
            let released: Vec<&str> = step
                .owned_annotations
                .iter()
                .copied()
                .filter(|k| {
                    desired
                        .meta()
                        .annotations
                        .as_ref()
                        .is_none_or(|a| !a.contains_key(*k))
                })
                .collect();
            (step.preserve)(&mut desired, &existing);
            metadata::drop_annotations(&mut desired, &released);
            let outcome = diff(&mut existing, &desired, &step.groups);
            if !outcome.changed {
                return Ok(Outcome::Unchanged);
            }
            info!(changes = %outcome.summary(), "updating");
            store.update(&existing).await?;
            Ok(Outcome::Updated(outcome.explanation))
        }
        (Transition::Delete, Some(_)) => delete_quietly::<K, S>(store, &ns, &name).await,
        _ => Ok(Outcome::Absent),
    }
}

async fn delete_quietly<K, S>(
    store: &S,
    ns: &str,
    name: &str,
) -> Result<Outcome, ReconcileErr>
where
    K: Managed,
    S: ObjectStore,
{
    match store.delete::<K>(ns, name).await {
        Ok(()) => {
            info!(%ns, %name, kind = %K::kind(&()), "deleted");
            Ok(Outcome::Deleted)
        }
        Err(ReconcileErr::NotFound(_)) => Ok(Outcome::Absent),
        Err(e) => Err(e),
    }
}

/// Remove the forbidden alternative form of an object, if present.
pub async fn ensure_absent<K, S>(
    store: &S,
    ns: &str,
    name: &str,
) -> Result<Outcome, ReconcileErr>
where
    K: Managed,
    S: ObjectStore,
{
    match probe::<K, S>(store, ns, name).await? {
        Some(_) => delete_quietly::<K, S>(store, ns, name).await,
        None => Ok(Outcome::Absent),
    }
}
