//! Webhook endpoint

use crate::ExecutorClient;
use crate::error::Result;
use renex_core::dto::hook::HookResponse;
use serde_json::Value as JsonValue;

impl ExecutorClient {
    /// Deliver a webhook payload to the executor
    ///
    /// # Arguments
    /// * `event_header` - Header naming the event, e.g. `x-github-event`
    /// * `event_kind` - Value of that header, e.g. `push`
    /// * `payload` - The webhook body
    pub async fn send_hook(
        &self,
        event_header: &str,
        event_kind: &str,
        payload: &JsonValue,
    ) -> Result<HookResponse> {
        let response = self
            .client
            .post(self.url("/hook"))
            .header(event_header, event_kind)
            .json(payload)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
