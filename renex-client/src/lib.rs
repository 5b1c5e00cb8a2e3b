//! Renex HTTP Client
//!
//! A small, type-safe client for the Renovate executor's HTTP API, used by
//! the `renex` CLI.
//!
//! # Example
//!
//! ```no_run
//! use renex_client::ExecutorClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ExecutorClient::new("http://localhost:4000").with_api_secret("s3cr3t");
//!
//!     let queue = client.list_queue().await?;
//!     println!("{} batches waiting", queue.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod hooks;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use renex_core::dto::hook::{HookResponse, HookStatus};
pub use renex_core::dto::jobs::{JobsResponse, QueueResponse};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Header carrying the inspection secret
pub const API_SECRET_HEADER: &str = "x-api-secret";

/// HTTP client for the executor API
#[derive(Debug, Clone)]
pub struct ExecutorClient {
    /// Base URL of the executor (e.g., "http://localhost:4000")
    base_url: String,
    /// Secret sent with inspection requests
    api_secret: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl ExecutorClient {
    /// Create a new executor client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the executor (e.g., "http://localhost:4000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new executor client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_secret: None,
            client,
        }
    }

    /// Send `secret` in the `x-api-secret` header of every request
    ///
    /// A blank secret is ignored.
    pub fn with_api_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.api_secret = (!secret.trim().is_empty()).then_some(secret);
        self
    }

    /// Get the base URL of the executor
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_secret {
            Some(secret) => request.header(API_SECRET_HEADER, secret),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                error_message(&error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Extracts the message of a `{ "error": ... }` body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
