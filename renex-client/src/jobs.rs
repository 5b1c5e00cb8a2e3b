//! Health and inspection endpoints

use crate::ExecutorClient;
use crate::error::{ClientError, Result};
use renex_core::dto::jobs::{JobsResponse, QueueResponse};

impl ExecutorClient {
    /// Check that the executor is up
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), "health check failed"));
        }

        Ok(())
    }

    /// List running batches of both work classes
    ///
    /// # Example
    /// ```no_run
    /// # use renex_client::ExecutorClient;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = ExecutorClient::new("http://localhost:4000");
    /// let jobs = client.list_jobs().await?;
    /// for job in &jobs.scheduled {
    ///     println!("{} started at {}", job.batch.id, job.started_at);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list_jobs(&self) -> Result<JobsResponse> {
        let request = self.authorize(self.client.get(self.url("/jobs")));
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// List queued batches of both work classes
    pub async fn list_queue(&self) -> Result<QueueResponse> {
        let request = self.authorize(self.client.get(self.url("/queue")));
        let response = request.send().await?;

        self.handle_response(response).await
    }
}
