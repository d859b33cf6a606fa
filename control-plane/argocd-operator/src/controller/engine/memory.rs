//! In-process [`ObjectStore`] with API-server-like semantics: resource
//! versions, uid assignment, AlreadyExists/NotFound/Conflict errors and a
//! separate status subresource. Used by tests and local dry runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::Mutex;

use super::store::{Managed, ObjectStore, object_key};
use crate::controller::ReconcileErr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
    PatchStatus,
}

/// One write accepted by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    pub verb: Verb,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    Conflict,
    Transient,
}

/// Makes the next matching call fail once. `List` faults match on kind
/// only and leave `name` empty.
#[derive(Clone, Debug)]
pub struct Fault {
    pub verb: Verb,
    pub kind: String,
    pub name: String,
    pub error: FaultKind,
}

type Key = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, JsonValue>,
    writes: Vec<WriteRecord>,
    faults: Vec<Fault>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    version: AtomicU64,
}

fn kind_of<K: Managed>() -> String {
    K::kind(&()).to_string()
}

fn labels_match(obj: &JsonValue, selector: &str) -> bool {
    let labels = obj.pointer("/metadata/labels").and_then(|l| l.as_object());
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .all(|term| {
            let (k, v) = term.split_once('=').unwrap_or((term, ""));
            labels
                .and_then(|l| l.get(k.trim()))
                .and_then(|x| x.as_str())
                .map(|x| x == v.trim())
                .unwrap_or(false)
        })
}

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut JsonValue, patch: &JsonValue) {
    match patch {
        JsonValue::Object(p) => {
            if !target.is_object() {
                *target = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(t) = target {
                for (k, v) in p {
                    if v.is_null() {
                        t.remove(k);
                    } else {
                        merge_patch(
                            t.entry(k.clone()).or_insert(JsonValue::Null),
                            v,
                        );
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Insert or overwrite an object as an external actor would, without
    /// recording a write. Returns the stored object.
    pub async fn seed<K: Managed>(&self, obj: &K) -> Result<K, ReconcileErr> {
        let (ns, name) = object_key(obj)?;
        let mut value = serde_json::to_value(obj)?;
        let rv = self.next_version();
        let mut st = self.state.lock().await;
        let key = (kind_of::<K>(), ns, name.clone());
        let uid = st
            .objects
            .get(&key)
            .and_then(|o| o.pointer("/metadata/uid").cloned())
            .unwrap_or_else(|| JsonValue::String(format!("uid-{name}-{rv}")));
        stamp_meta(&mut value, &rv, Some(uid));
        st.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    /// Mutate a stored object out of band (e.g. another actor adding a
    /// label). Not recorded as a write.
    pub async fn mutate<K, F>(
        &self,
        ns: &str,
        name: &str,
        f: F,
    ) -> Result<K, ReconcileErr>
    where
        K: Managed,
        F: FnOnce(&mut K),
    {
        let current: K = self.get(ns, name).await?.ok_or_else(|| {
            ReconcileErr::NotFound(format!("{}/{}", ns, name))
        })?;
        let mut next = current;
        f(&mut next);
        self.seed(&next).await
    }

    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().await.writes.clone()
    }

    pub async fn clear_writes(&self) {
        self.state.lock().await.writes.clear();
    }

    pub async fn inject_fault(&self, fault: Fault) {
        self.state.lock().await.faults.push(fault);
    }

    pub async fn count<K: Managed>(&self, ns: &str) -> usize {
        let kind = kind_of::<K>();
        self.state
            .lock()
            .await
            .objects
            .keys()
            .filter(|(k, n, _)| *k == kind && n == ns)
            .count()
    }
}

fn stamp_meta(value: &mut JsonValue, rv: &str, uid: Option<JsonValue>) {
    if let Some(meta) =
        value.get_mut("metadata").and_then(|m| m.as_object_mut())
    {
        meta.insert("resourceVersion".into(), JsonValue::String(rv.into()));
        if let Some(uid) = uid {
            meta.insert("uid".into(), uid);
        }
    }
}

impl State {
    fn take_fault(
        &mut self,
        verb: Verb,
        kind: &str,
        name: &str,
    ) -> Option<ReconcileErr> {
        let idx = self.faults.iter().position(|f| {
            f.verb == verb && f.kind == kind && f.name == name
        })?;
        let fault = self.faults.remove(idx);
        let msg = format!("injected fault on {:?} {}/{}", verb, kind, name);
        Some(match fault.error {
            FaultKind::Conflict => ReconcileErr::Conflict(msg),
            FaultKind::Transient => ReconcileErr::Transient(msg),
        })
    }

    fn record(&mut self, verb: Verb, key: &Key) {
        self.writes.push(WriteRecord {
            verb,
            kind: key.0.clone(),
            namespace: key.1.clone(),
            name: key.2.clone(),
        });
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: Managed>(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<K>, ReconcileErr> {
        let mut st = self.state.lock().await;
        let key = (kind_of::<K>(), ns.to_string(), name.to_string());
        if let Some(err) = st.take_fault(Verb::Get, &key.0, name) {
            return Err(err);
        }
        match st.objects.get(&key) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    async fn list<K: Managed>(
        &self,
        ns: &str,
        label_selector: &str,
    ) -> Result<Vec<K>, ReconcileErr> {
        let kind = kind_of::<K>();
        let mut st = self.state.lock().await;
        if let Some(err) = st.take_fault(Verb::List, &kind, "") {
            return Err(err);
        }
        st.objects
            .iter()
            .filter(|((k, n, _), v)| {
                *k == kind && n == ns && labels_match(v, label_selector)
            })
            .map(|(_, v)| {
                serde_json::from_value::<K>(v.clone()).map_err(ReconcileErr::from)
            })
            .collect()
    }

    async fn create<K: Managed>(&self, obj: &K) -> Result<K, ReconcileErr> {
        let (ns, name) = object_key(obj)?;
        let key = (kind_of::<K>(), ns, name.clone());
        let mut value = serde_json::to_value(obj)?;
        let rv = self.next_version();
        let mut st = self.state.lock().await;
        if let Some(err) = st.take_fault(Verb::Create, &key.0, &name) {
            return Err(err);
        }
        if st.objects.contains_key(&key) {
            return Err(ReconcileErr::Conflict(format!(
                "{} {}/{} already exists",
                key.0, key.1, key.2
            )));
        }
        stamp_meta(
            &mut value,
            &rv,
            Some(JsonValue::String(format!("uid-{name}-{rv}"))),
        );
        st.objects.insert(key.clone(), value.clone());
        st.record(Verb::Create, &key);
        Ok(serde_json::from_value(value)?)
    }

    async fn update<K: Managed>(&self, obj: &K) -> Result<K, ReconcileErr> {
        let (ns, name) = object_key(obj)?;
        let key = (kind_of::<K>(), ns, name.clone());
        let mut value = serde_json::to_value(obj)?;
        let rv = self.next_version();
        let mut st = self.state.lock().await;
        if let Some(err) = st.take_fault(Verb::Update, &key.0, &name) {
            return Err(err);
        }
        let stored = st.objects.get(&key).ok_or_else(|| {
            ReconcileErr::NotFound(format!("{} {}/{}", key.0, key.1, key.2))
        })?;
        let stored_rv = stored.pointer("/metadata/resourceVersion").cloned();
        let incoming_rv = value.pointer("/metadata/resourceVersion").cloned();
        if stored_rv != incoming_rv {
            return Err(ReconcileErr::Conflict(format!(
                "{} {}/{}: resourceVersion {:?} is stale (stored {:?})",
                key.0, key.1, key.2, incoming_rv, stored_rv
            )));
        }
        let uid = stored.pointer("/metadata/uid").cloned();
        let status = stored.get("status").cloned();
        if let Some(obj) = value.as_object_mut() {
            match status {
                Some(s) => {
                    obj.insert("status".into(), s);
                }
                None => {
                    obj.remove("status");
                }
            }
        }
        stamp_meta(&mut value, &rv, uid);
        st.objects.insert(key.clone(), value.clone());
        st.record(Verb::Update, &key);
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: Managed>(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<(), ReconcileErr> {
        let key = (kind_of::<K>(), ns.to_string(), name.to_string());
        let mut st = self.state.lock().await;
        if let Some(err) = st.take_fault(Verb::Delete, &key.0, name) {
            return Err(err);
        }
        if st.objects.remove(&key).is_none() {
            return Err(ReconcileErr::NotFound(format!(
                "{} {}/{}",
                key.0, key.1, key.2
            )));
        }
        st.record(Verb::Delete, &key);
        Ok(())
    }

    async fn patch_status<K: Managed>(
        &self,
        ns: &str,
        name: &str,
        status_patch: &JsonValue,
    ) -> Result<(), ReconcileErr> {
        let key = (kind_of::<K>(), ns.to_string(), name.to_string());
        let rv = self.next_version();
        let mut st = self.state.lock().await;
        if let Some(err) = st.take_fault(Verb::PatchStatus, &key.0, name) {
            return Err(err);
        }
        let stored = st.objects.get_mut(&key).ok_or_else(|| {
            ReconcileErr::NotFound(format!("{} {}/{}", key.0, key.1, key.2))
        })?;
        if let Some(obj) = stored.as_object_mut() {
            let status = obj.entry("status").or_insert(JsonValue::Null);
            merge_patch(status, status_patch);
        }
        stamp_meta(stored, &rv, None);
        st.record(Verb::PatchStatus, &key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use serde_json::json;

    fn cm(name: &str) -> ConfigMap {
        let mut c = ConfigMap::default();
        c.metadata.name = Some(name.into());
        c.metadata.namespace = Some("ns".into());
        c
    }

    #[test]
    fn merge_patch_removes_null_and_merges_nested() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_patch(&mut target, &json!({"a": null, "b": {"c": 4}}));
        assert_eq!(target, json!({"b": {"c": 4, "d": 3}}));
    }

    #[test]
    fn selector_matches_all_terms() {
        let obj = json!({"metadata": {"labels": {"a": "1", "b": "2"}}});
        assert!(labels_match(&obj, ""));
        assert!(labels_match(&obj, "a=1"));
        assert!(labels_match(&obj, "a=1,b=2"));
        assert!(!labels_match(&obj, "a=1,b=3"));
        assert!(!labels_match(&json!({"metadata": {}}), "a=1"));
    }

    #[tokio::test]
    async fn create_twice_is_conflict_and_stale_update_is_rejected() {
        let store = MemoryStore::new();
        let created = store.create(&cm("a")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        let err = store.create(&cm("a")).await.unwrap_err();
        assert!(err.is_conflict());

        store
            .mutate::<ConfigMap, _>("ns", "a", |c| {
                c.data = Some([("k".to_string(), "v".to_string())].into());
            })
            .await
            .unwrap();
        let err = store.update(&created).await.unwrap_err();
        assert!(err.is_conflict(), "stale resourceVersion must conflict");
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.delete::<ConfigMap>("ns", "nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let store = MemoryStore::new();
        store
            .inject_fault(Fault {
                verb: Verb::Create,
                kind: "ConfigMap".into(),
                name: "a".into(),
                error: FaultKind::Transient,
            })
            .await;
        assert!(store.create(&cm("a")).await.is_err());
        assert!(store.create(&cm("a")).await.is_ok());
    }

    #[tokio::test]
    async fn read_faults_fail_get_and_list_once() {
        let store = MemoryStore::new();
        store.seed(&cm("a")).await.unwrap();
        for (verb, name) in [(Verb::Get, "a"), (Verb::List, "")] {
            store
                .inject_fault(Fault {
                    verb,
                    kind: "ConfigMap".into(),
                    name: name.into(),
                    error: FaultKind::Transient,
                })
                .await;
        }
        let err = store.get::<ConfigMap>("ns", "a").await.unwrap_err();
        assert!(matches!(err, ReconcileErr::Transient(_)));
        assert!(store.get::<ConfigMap>("ns", "a").await.unwrap().is_some());

        assert!(store.list::<ConfigMap>("ns", "").await.is_err());
        assert_eq!(store.list::<ConfigMap>("ns", "").await.unwrap().len(), 1);
    }
}
