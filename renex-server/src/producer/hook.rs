//! Event producer
//!
//! Resolves a webhook through discovery and queues a single-repository batch
//! in the event class.

use std::sync::Arc;

use axum::http::HeaderMap;
use renex_core::dto::hook::{HookResponse, HookStatus};
use renex_core::{Batch, WorkClass};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::discovery::{Discovery, DiscoveryError};
use crate::scheduler::{Admission, Scheduler};

#[derive(Clone)]
pub struct HookProducer {
    discovery: Arc<dyn Discovery>,
    scheduler: Arc<Scheduler>,
}

impl HookProducer {
    pub fn new(discovery: Arc<dyn Discovery>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            discovery,
            scheduler,
        }
    }

    /// Handles one webhook delivery
    pub async fn handle(
        &self,
        headers: &HeaderMap,
        payload: &JsonValue,
    ) -> Result<HookResponse, DiscoveryError> {
        let outcome = self.discovery.check(headers, payload).await?;
        let merge_request = self.discovery.is_merge_request(&outcome.event_kind);

        let Some(repository) = outcome.repository else {
            debug!(
                "Ignoring {} event, repository is not managed here",
                outcome.event_kind
            );
            return Ok(HookResponse {
                status: HookStatus::Ignored,
                batch_id: None,
                event_kind: outcome.event_kind,
                merge_request,
            });
        };

        info!("Received {} event for {}", outcome.event_kind, repository.path);

        let batch = Batch::single(WorkClass::Event, repository);
        let batch_id = batch.id.clone();
        let status = match self.scheduler.enqueue(batch) {
            Admission::Queued => HookStatus::Queued,
            Admission::Duplicate => HookStatus::Duplicate,
        };

        Ok(HookResponse {
            status,
            batch_id: Some(batch_id),
            event_kind: outcome.event_kind,
            merge_request,
        })
    }
}
