//! Inspection API Handlers
//!
//! Read-only views of the scheduler, split by work class.

use axum::{Json, extract::State};
use renex_core::dto::jobs::{JobsResponse, QueueResponse};

use super::AppState;

/// GET /jobs
/// Batches currently running
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    tracing::debug!("Listing running jobs");
    Json(state.scheduler.jobs())
}

/// GET /queue
/// Batches waiting for a free slot
pub async fn list_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    tracing::debug!("Listing queued jobs");
    Json(state.scheduler.queue())
}
