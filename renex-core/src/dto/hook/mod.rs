//! Webhook DTOs

use serde::{Deserialize, Serialize};

use crate::domain::batch::BatchId;

/// What the event producer did with a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    /// A new event batch was queued
    Queued,
    /// A batch with the same identity is already queued or running
    Duplicate,
    /// Discovery declined the repository, nothing was queued
    Ignored,
}

/// Response of `POST /hook`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResponse {
    pub status: HookStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    pub event_kind: String,
    pub merge_request: bool,
}
