use std::sync::Arc;

use tracing::trace;

type Differs<K> = Box<dyn Fn(&K, &K) -> bool + Send + Sync>;
type CopyInto<K> = Box<dyn Fn(&mut K, &K) + Send + Sync>;

/// Side effect applied to the existing object when its group differs.
pub type ExtraAction<K> = Box<dyn Fn(&mut K) + Send + Sync>;

/// A named unit of comparison between an existing and a desired object.
///
/// Each group owns an explicit projection of the fields it manages, how to
/// tell them apart and how to copy the desired side onto the existing
/// object. Groups never replace the whole object.
pub struct FieldGroup<K> {
    name: &'static str,
    differs: Differs<K>,
    copy: CopyInto<K>,
    extra: Option<ExtraAction<K>>,
}

impl<K: 'static> FieldGroup<K> {
    /// Fully custom group.
    pub fn new(
        name: &'static str,
        differs: impl Fn(&K, &K) -> bool + Send + Sync + 'static,
        copy: impl Fn(&mut K, &K) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            differs: Box::new(differs),
            copy: Box::new(copy),
            extra: None,
        }
    }

    /// The desired projection is authoritative, including explicit emptiness.
    pub fn strict<V, G, S>(name: &'static str, get: G, set: S) -> Self
    where
        V: PartialEq + 'static,
        G: Fn(&K) -> V + Send + Sync + 'static,
        S: Fn(&mut K, V) + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let get_copy = get.clone();
        Self::new(
            name,
            move |existing, desired| get(existing) != get(desired),
            move |existing, desired| set(existing, get_copy(desired)),
        )
    }

    /// A desired `None` means the field is not managed: it is neither
    /// compared nor cleared on the existing object.
    pub fn optional<V, G, S>(name: &'static str, get: G, set: S) -> Self
    where
        V: PartialEq + 'static,
        G: Fn(&K) -> Option<V> + Send + Sync + 'static,
        S: Fn(&mut K, V) + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let get_copy = get.clone();
        Self::new(
            name,
            move |existing, desired| match get(desired) {
                None => false,
                Some(want) => get(existing).as_ref() != Some(&want),
            },
            move |existing, desired| {
                if let Some(want) = get_copy(desired) {
                    set(existing, want);
                }
            },
        )
    }

    pub fn with_extra(
        mut self,
        extra: impl Fn(&mut K) + Send + Sync + 'static,
    ) -> Self {
        self.extra = Some(Box::new(extra));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    pub changed: bool,
    /// One entry per differing group, in group order.
    pub explanation: Vec<String>,
}

impl DiffOutcome {
    pub fn summary(&self) -> String {
        self.explanation.join(", ")
    }
}

/// Compare `existing` against `desired` group by group, copying each
/// differing group onto `existing` and running its extra action once.
pub fn diff<K>(
    existing: &mut K,
    desired: &K,
    groups: &[FieldGroup<K>],
) -> DiffOutcome {
    let mut out = DiffOutcome::default();
    for group in groups {
        if !(group.differs)(existing, desired) {
            continue;
        }
        trace!(group = group.name, "field group differs");
        (group.copy)(existing, desired);
        if let Some(extra) = &group.extra {
            extra(existing);
        }
        out.changed = true;
        out.explanation.push(format!("{} changed", group.name));
    }
    out
}
