//! CLI configuration

use renex_client::ExecutorClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the executor
    pub url: String,
    /// Secret sent to the inspection endpoints
    pub api_secret: Option<String>,
}

impl Config {
    /// Build a client for the configured executor
    pub fn client(&self) -> ExecutorClient {
        let client = ExecutorClient::new(&self.url);
        match &self.api_secret {
            Some(secret) => client.with_api_secret(secret),
            None => client,
        }
    }
}
