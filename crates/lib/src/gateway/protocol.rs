//! Gateway HTTP request/response types for the queueing endpoints.

use crate::template::{EventInfo, StaffMember, TaskInfo};
use serde::{Deserialize, Serialize};

/// Body for POST /api/send-bulk-messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBulkRequest {
    #[serde(default)]
    pub messages: Vec<BulkItem>,
}

/// One ad-hoc message: raw number plus prerendered text. Fields are
/// optional so a bad item can be rejected individually.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItem {
    #[serde(default, alias = "phone")]
    pub number: Option<String>,
    #[serde(default, alias = "text")]
    pub message: Option<String>,
}

/// Body for POST /api/send-event-messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEventRequest {
    pub event: EventInfo,
    #[serde(default, alias = "staff_list", alias = "staff")]
    pub staff_list: Vec<StaffMember>,
}

/// Body for POST /api/send-task-messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTaskRequest {
    pub task: TaskInfo,
    #[serde(default, alias = "staff_list", alias = "staff")]
    pub staff_list: Vec<StaffMember>,
}

/// Per-item acknowledgment returned by the queueing endpoints. `queued`
/// means accepted into the dispatch queue, not delivered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueAck {
    /// Recipient as supplied by the caller.
    pub recipient: String,
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnqueueAck {
    pub fn queued(recipient: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            queued: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn rejected(recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            queued: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}
