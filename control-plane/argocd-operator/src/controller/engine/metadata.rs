use std::collections::BTreeMap;

use kube::Resource;

use super::workload::PodWorkload;

/// Copy every key present on `existing` but missing from `desired`.
fn merge_missing(
    desired: &mut Option<BTreeMap<String, String>>,
    existing: Option<&BTreeMap<String, String>>,
) {
    let Some(existing) = existing.filter(|m| !m.is_empty()) else {
        return;
    };
    let target = desired.get_or_insert_with(BTreeMap::new);
    for (k, v) in existing {
        target.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

/// Keep labels and annotations stamped on the live object by other actors,
/// so the diff never strips metadata this operator does not own.
pub fn preserve<K: Resource>(mut desired: K, existing: &K) -> K {
    preserve_object(&mut desired, existing);
    desired
}

pub fn preserve_object<K: Resource>(desired: &mut K, existing: &K) {
    let live = existing.meta();
    let meta = desired.meta_mut();
    merge_missing(&mut meta.labels, live.labels.as_ref());
    merge_missing(&mut meta.annotations, live.annotations.as_ref());
}

/// Remove annotation keys this operator owns but no longer wants.
pub fn drop_annotations<K: Resource>(obj: &mut K, keys: &[&str]) {
    if let Some(annotations) = obj.meta_mut().annotations.as_mut() {
        annotations.retain(|k, _| !keys.contains(&k.as_str()));
    }
}

/// Object metadata plus pod-template metadata. Rollout trigger labels live
/// on the template and survive through this path.
pub fn preserve_workload<W: PodWorkload>(desired: &mut W, existing: &W) {
    preserve_object(desired, existing);
    let labels = existing.template_labels();
    let annotations = existing.template_annotations();
    if labels.is_empty() && annotations.is_empty() {
        return;
    }
    let meta = desired.template_meta_mut();
    merge_missing(&mut meta.labels, Some(&labels));
    merge_missing(&mut meta.annotations, Some(&annotations));
}
