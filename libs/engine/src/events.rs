//! Workflow lifecycle events

use serde_json::Value;

use weft_broker::Producer;

/// Published when a dispatch enters a handler
pub const WORKFLOW_STARTED_TOPIC: &str = "workflow.started";

/// Published when a dispatch returns successfully
pub const WORKFLOW_COMPLETED_TOPIC: &str = "workflow.completed";

/// Published when a dispatch returns an error
pub const WORKFLOW_FAILED_TOPIC: &str = "workflow.failed";

/// Best-effort lifecycle publication; delivery failures are logged
pub(crate) fn publish_lifecycle(producer: Option<&Producer>, topic: &str, payload: &Value) {
    let Some(producer) = producer else { return };
    match serde_json::to_vec(payload) {
        Ok(bytes) => {
            if let Err(err) = producer.send_message(topic, &bytes) {
                tracing::warn!(topic, error = %err, "lifecycle event publish failed");
            }
        }
        Err(err) => tracing::warn!(topic, error = %err, "lifecycle event serialization failed"),
    }
}
