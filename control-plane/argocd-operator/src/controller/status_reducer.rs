use crate::crd::argocd::{ArgoCDStatus, Condition, ConditionType};

/// Merge the pass's observed status into the current one. Checksums are
/// owned by the rollout propagator and always carried over from `current`.
/// A condition keeps its previous transition time while its status holds.
pub fn merge_status(current: Option<&ArgoCDStatus>, mut desired: ArgoCDStatus) -> ArgoCDStatus {
    let Some(cur) = current else {
        desired.checksums.clear();
        return desired;
    };
    desired.checksums = cur.checksums.clone();
    if desired.observed_generation.is_none() {
        desired.observed_generation = cur.observed_generation;
    }
    let previous = cur.conditions.as_deref().unwrap_or_default();
    let incoming = desired.conditions.take().unwrap_or_default();
    desired.conditions = Some(upsert_conditions(previous, incoming));
    desired
}

fn upsert_conditions(existing: &[Condition], incoming: Vec<Condition>) -> Vec<Condition> {
    let mut out: Vec<Condition> = existing.to_vec();
    for mut inc in incoming {
        match out.iter().position(|c| c.type_ == inc.type_) {
            Some(idx) => {
                if out[idx].status == inc.status {
                    inc.last_transition_time = out[idx].last_transition_time.clone();
                }
                out[idx] = inc;
            }
            None => out.push(inc),
        }
    }
    out.sort_by_key(|c| cond_rank(&c.type_));
    out
}

fn cond_rank(t: &ConditionType) -> u8 {
    match t {
        ConditionType::Available => 0,
        ConditionType::Reconciled => 1,
        ConditionType::Unknown => 250,
    }
}

/// Clear fields that change on every pass without carrying meaning.
fn normalize_status(mut s: ArgoCDStatus) -> ArgoCDStatus {
    s.last_updated = None;
    if let Some(conds) = s.conditions.as_mut() {
        for c in conds.iter_mut() {
            c.last_transition_time = None;
        }
    }
    s.checksums.clear();
    s
}

/// Patch only when something other than timestamps changed.
pub fn should_patch_status(current: Option<&ArgoCDStatus>, merged: &ArgoCDStatus) -> bool {
    match current {
        None => true,
        Some(cur) => normalize_status(cur.clone()) != normalize_status(merged.clone()),
    }
}
