//! Content-addressed cascading restarts.
//!
//! A tracked secret's content checksum lives in the owner's status. When the
//! live content hashes differently, every dependent workload gets a fresh
//! value in its trigger label (forcing a new pod template), and only after
//! all of them were written is the new checksum committed. A failure in
//! between leaves the old checksum in place, so the next pass re-triggers
//! the whole set.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Secret;
use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use super::clock::{Clock, label_timestamp};
use super::prober::probe;
use super::store::{Managed, ObjectStore};
use super::workload::PodWorkload;
use crate::controller::ReconcileErr;

pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY: &str = "tls.key";

/// Owners whose status carries a checksum map.
pub trait ChecksumStatus: Managed {
    fn checksum(&self, key: &str) -> Option<&str>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

/// A workload to restart and the template label used to do it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RolloutTrigger {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    pub label_key: &'static str,
}

impl RolloutTrigger {
    /// Stamp the trigger label. `Ok(false)` when the workload does not exist.
    pub async fn apply<S, C>(&self, store: &S, clock: &C) -> Result<bool, ReconcileErr>
    where
        S: ObjectStore,
        C: Clock + ?Sized,
    {
        match self.kind {
            WorkloadKind::Deployment => stamp::<Deployment, S, C>(store, clock, self).await,
            WorkloadKind::StatefulSet => stamp::<StatefulSet, S, C>(store, clock, self).await,
        }
    }
}

/// A value distinct from the label's previous one.
fn fresh_stamp<C: Clock + ?Sized>(clock: &C, previous: Option<&str>) -> String {
    let stamp = label_timestamp(clock.now());
    match previous {
        Some(p) if p == stamp => format!("{stamp}1"),
        _ => stamp,
    }
}

async fn stamp<W, S, C>(
    store: &S,
    clock: &C,
    trigger: &RolloutTrigger,
) -> Result<bool, ReconcileErr>
where
    W: PodWorkload,
    S: ObjectStore,
    C: Clock + ?Sized,
{
    let Some(mut workload) = probe::<W, S>(store, &trigger.namespace, &trigger.name).await? else {
        debug!(
            ns = %trigger.namespace,
            name = %trigger.name,
            "dependent absent; nothing to restart"
        );
        return Ok(false);
    };
    let previous = workload.template_label(trigger.label_key);
    let value = fresh_stamp(clock, previous.as_deref());
    workload.set_template_label(trigger.label_key, value);
    store.update(&workload).await?;
    info!(
        ns = %trigger.namespace,
        name = %trigger.name,
        label = trigger.label_key,
        "rollout triggered"
    );
    Ok(true)
}

/// Hex sha256 over the certificate followed by the key.
pub fn content_checksum(cert: &[u8], key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cert);
    hasher.update(key);
    hex::encode(hasher.finalize())
}

fn secret_field<'a>(secret: &'a Secret, field: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(field))
        .map(|b| b.0.as_slice())
}

/// Where tracked content comes from and what depends on it.
#[derive(Clone, Debug)]
pub struct TrackedContent {
    pub secret_namespace: String,
    pub secret_name: String,
    pub status_key: &'static str,
    pub dependents: Vec<RolloutTrigger>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentChange {
    /// Secret or one of its fields is missing.
    NoContent,
    Unchanged,
    Rolled {
        checksum: String,
        /// Names of the dependents that were restarted.
        triggered: Vec<String>,
    },
}

/// Compare tracked content against the owner's committed checksum and, on
/// change, restart every dependent before committing the new checksum.
#[instrument(skip_all, fields(secret = %tracked.secret_name, key = tracked.status_key))]
pub async fn reconcile_content_change<I, S, C>(
    store: &S,
    clock: &C,
    owner_ns: &str,
    owner_name: &str,
    tracked: &TrackedContent,
) -> Result<ContentChange, ReconcileErr>
where
    I: ChecksumStatus,
    S: ObjectStore,
    C: Clock + ?Sized,
{
    let Some(secret) =
        probe::<Secret, S>(store, &tracked.secret_namespace, &tracked.secret_name).await?
    else {
        return Ok(ContentChange::NoContent);
    };
    let (Some(cert), Some(key)) = (
        secret_field(&secret, TLS_CERT_KEY),
        secret_field(&secret, TLS_PRIVATE_KEY),
    ) else {
        debug!("secret lacks tls.crt or tls.key");
        return Ok(ContentChange::NoContent);
    };
    let checksum = content_checksum(cert, key);

    // The owner passed to a pass may be a cached copy; the committed value
    // must come from the latest read.
    let owner: I = store.get(owner_ns, owner_name).await?.ok_or_else(|| {
        ReconcileErr::NotFound(format!("{}/{}", owner_ns, owner_name))
    })?;
    if owner.checksum(tracked.status_key) == Some(checksum.as_str()) {
        return Ok(ContentChange::Unchanged);
    }

    let mut triggered = Vec::with_capacity(tracked.dependents.len());
    for dependent in &tracked.dependents {
        if dependent.apply(store, clock).await? {
            triggered.push(dependent.name.clone());
        }
    }

    let patch = json!({ "checksums": { tracked.status_key: &checksum } });
    store.patch_status::<I>(owner_ns, owner_name, &patch).await?;
    info!(triggered = triggered.len(), "checksum committed");
    Ok(ContentChange::Rolled { checksum, triggered })
}

/// Drop a checksum entry for content that is no longer tracked.
/// Returns whether a write happened.
pub async fn clear_checksum<I, S>(
    store: &S,
    owner: &I,
    owner_ns: &str,
    owner_name: &str,
    status_key: &str,
) -> Result<bool, ReconcileErr>
where
    I: ChecksumStatus,
    S: ObjectStore,
{
    if owner.checksum(status_key).is_none() {
        return Ok(false);
    }
    let patch = json!({ "checksums": { status_key: JsonValue::Null } });
    store.patch_status::<I>(owner_ns, owner_name, &patch).await?;
    debug!(%owner_ns, %owner_name, %status_key, "checksum cleared");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::engine::clock::StepClock;

    #[test]
    fn checksum_depends_on_both_parts_and_order() {
        let a = content_checksum(b"foo", b"bar");
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_checksum(b"baz", b"bar"));
        assert_eq!(a, content_checksum(b"foob", b"ar"));
    }

    #[test]
    fn fresh_stamp_never_repeats_previous() {
        let clock = StepClock::starting_at(1_700_000_000);
        let first = fresh_stamp(&clock, None);
        let same = StepClock::starting_at(1_700_000_000);
        let second = fresh_stamp(&same, Some(&first));
        assert_ne!(first, second);
    }
}
