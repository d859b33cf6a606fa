use kube::Resource;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::debug;

use crate::crd::argocd::ArgoCD;

pub const REASON_CREATED: &str = "Created";
pub const REASON_DELETED: &str = "Deleted";
pub const REASON_ROLLOUT_TRIGGERED: &str = "RolloutTriggered";

pub async fn emit_event(
    recorder: &Recorder,
    instance: &ArgoCD,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let event = Event {
        type_: EventType::Normal,
        reason: reason.into(),
        note,
        action: action.into(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(&event, &instance.object_ref(&())).await {
        debug!(error = %e, %reason, "event publish failed");
    }
}
