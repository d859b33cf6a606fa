#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::super::status_reducer::{merge_status, should_patch_status};
    use crate::crd::argocd::{ArgoCDStatus, Condition, ConditionStatus, ConditionType};

    fn condition(type_: ConditionType, status: ConditionStatus, at: &str) -> Condition {
        Condition {
            type_,
            status,
            reason: None,
            message: None,
            last_transition_time: Some(at.into()),
        }
    }

    fn status(phase: &str, at: &str, available: ConditionStatus) -> ArgoCDStatus {
        ArgoCDStatus {
            phase: Some(phase.into()),
            last_updated: Some(at.into()),
            server: Some("Running".into()),
            conditions: Some(vec![condition(ConditionType::Available, available, at)]),
            ..Default::default()
        }
    }

    #[test]
    fn checksums_are_carried_over_from_current() {
        let mut current = status("Available", "t1", ConditionStatus::True);
        current.checksums = BTreeMap::from([("redis-tls".to_string(), "abc".to_string())]);
        let mut desired = status("Available", "t2", ConditionStatus::True);
        desired.checksums = BTreeMap::from([("redis-tls".to_string(), "stale".to_string())]);

        let merged = merge_status(Some(&current), desired);
        assert_eq!(merged.checksums.get("redis-tls").map(String::as_str), Some("abc"));
    }

    #[test]
    fn transition_time_is_kept_while_condition_holds() {
        let current = status("Available", "t1", ConditionStatus::True);
        let merged = merge_status(Some(&current), status("Available", "t2", ConditionStatus::True));
        let cond = &merged.conditions.as_ref().unwrap()[0];
        assert_eq!(cond.last_transition_time.as_deref(), Some("t1"));

        let merged = merge_status(Some(&current), status("Pending", "t3", ConditionStatus::False));
        let cond = &merged.conditions.as_ref().unwrap()[0];
        assert_eq!(cond.last_transition_time.as_deref(), Some("t3"));
    }

    #[test]
    fn unrelated_conditions_are_preserved_and_ordered() {
        let mut current = status("Available", "t1", ConditionStatus::True);
        current.conditions = Some(vec![condition(
            ConditionType::Reconciled,
            ConditionStatus::True,
            "t0",
        )]);
        let merged = merge_status(Some(&current), status("Available", "t2", ConditionStatus::True));
        let types: Vec<_> = merged.conditions.unwrap().iter().map(|c| c.type_).collect();
        assert_eq!(types, vec![ConditionType::Available, ConditionType::Reconciled]);
    }

    #[test]
    fn timestamp_only_changes_do_not_patch() {
        let current = status("Available", "t1", ConditionStatus::True);
        let merged = merge_status(Some(&current), status("Available", "t2", ConditionStatus::True));
        assert!(!should_patch_status(Some(&current), &merged));

        let mut changed = merged.clone();
        changed.server = Some("Pending".into());
        assert!(should_patch_status(Some(&current), &changed));
        assert!(should_patch_status(None, &merged));
    }
}
