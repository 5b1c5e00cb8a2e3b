//! Repository discovery
//!
//! Answers two questions for the producers: which repositories should be
//! checked on a schedule, and which repository (if any) a webhook is about.
//!
//! Three sources are available, picked with `RE_HANDLER`:
//! - [`GitHubDiscovery`]: GitHub REST API
//! - [`GitLabDiscovery`]: GitLab REST API
//! - [`InventoryDiscovery`]: a local JSON file

pub mod github;
pub mod gitlab;
pub mod inventory;

pub use github::GitHubDiscovery;
pub use gitlab::GitLabDiscovery;
pub use inventory::InventoryDiscovery;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use renex_core::Repository;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use crate::config::DiscoveryConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The repository source could not be read
    #[error("repository source unavailable: {0}")]
    Unavailable(String),

    /// The repository source is misconfigured
    #[error("invalid discovery configuration: {0}")]
    Config(String),

    /// The webhook carries no recognised event header
    #[error("missing event header")]
    MissingEvent,

    /// The webhook event kind is not handled
    #[error("event '{0}' is not allowed")]
    EventNotAllowed(String),

    /// The webhook payload lacks required fields
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl DiscoveryError {
    /// Whether the error is caused by the incoming request rather than by
    /// the executor
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Unavailable(_) | Self::Config(_))
    }
}

/// Where repositories come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscoverySource {
    #[default]
    Inventory,
    GitHub,
    GitLab,
}

impl DiscoverySource {
    /// Variable holding the API token this source needs, if any
    pub fn token_var(self) -> Option<&'static str> {
        match self {
            DiscoverySource::Inventory => None,
            DiscoverySource::GitHub => Some("RE_GITHUB_TOKEN"),
            DiscoverySource::GitLab => Some("RE_GITLAB_TOKEN"),
        }
    }
}

impl FromStr for DiscoverySource {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inventory" | "file" => Ok(DiscoverySource::Inventory),
            "github" => Ok(DiscoverySource::GitHub),
            "gitlab" => Ok(DiscoverySource::GitLab),
            other => Err(DiscoveryError::Config(format!(
                "unknown handler '{}', expected github, gitlab or inventory",
                other
            ))),
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoverySource::Inventory => "inventory",
            DiscoverySource::GitHub => "github",
            DiscoverySource::GitLab => "gitlab",
        };
        f.write_str(name)
    }
}

/// Owner, topic and path filters shared by every source
#[derive(Debug, Clone, Default)]
pub struct RepositoryFilter {
    owners: Vec<String>,
    topics: Vec<String>,
    repositories: Vec<String>,
}

impl RepositoryFilter {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            owners: config.owners.iter().map(|o| o.to_ascii_lowercase()).collect(),
            topics: config.topics.clone(),
            repositories: config.repositories.clone(),
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Owners match case-insensitively, an empty list allows all
    pub fn owner_allowed(&self, owner: &str) -> bool {
        self.owners.is_empty() || self.owners.contains(&owner.to_ascii_lowercase())
    }

    /// Paths must match the allow-list exactly, an empty list allows all
    pub fn path_allowed(&self, path: &str) -> bool {
        self.repositories.is_empty() || self.repositories.iter().any(|p| p == path)
    }

    pub fn accepts(&self, repository: &Repository) -> bool {
        self.owner_allowed(repository.owner())
            && repository.has_topics(&self.topics)
            && self.path_allowed(&repository.path)
    }

    /// Keeps accepted repositories, first occurrence of each path wins
    pub fn select(&self, repositories: Vec<Repository>) -> Vec<Repository> {
        let mut seen = HashSet::new();
        repositories
            .into_iter()
            .filter(|repo| self.accepts(repo))
            .filter(|repo| seen.insert(repo.path.clone()))
            .collect()
    }
}

/// HTTP client shared by the hosting API sources
fn http_client() -> Result<reqwest::Client, DiscoveryError> {
    reqwest::Client::builder()
        .user_agent(concat!("renovate-executor/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| DiscoveryError::Config(format!("cannot build HTTP client: {}", e)))
}

fn unavailable(context: &'static str) -> impl FnOnce(reqwest::Error) -> DiscoveryError {
    move |e| DiscoveryError::Unavailable(format!("{}: {}", context, e))
}

/// Builds the discovery selected by `config.source`
pub fn create_discovery(config: &DiscoveryConfig) -> Result<Arc<dyn Discovery>, DiscoveryError> {
    let discovery: Arc<dyn Discovery> = match config.source {
        DiscoverySource::Inventory => {
            info!(
                "Reading repositories from {}",
                config.repositories_file.display()
            );
            Arc::new(InventoryDiscovery::new(config.clone()))
        }
        DiscoverySource::GitHub => {
            let discovery = GitHubDiscovery::new(config)?;
            info!("Discovering repositories on GitHub at {}", discovery.endpoint());
            Arc::new(discovery)
        }
        DiscoverySource::GitLab => {
            let discovery = GitLabDiscovery::new(config)?;
            info!("Discovering repositories on GitLab at {}", discovery.endpoint());
            Arc::new(discovery)
        }
    };

    Ok(discovery)
}

/// Result of resolving a webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Repository to check, `None` if it is not managed by this executor
    pub repository: Option<Repository>,

    /// Event kind as sent by the source-control host
    pub event_kind: String,
}

#[async_trait]
pub trait Discovery: Send + Sync {
    /// All repositories eligible for scheduled checks
    async fn fetch(&self) -> Result<Vec<Repository>, DiscoveryError>;

    /// Resolves a webhook to at most one repository
    async fn check(
        &self,
        headers: &HeaderMap,
        payload: &JsonValue,
    ) -> Result<CheckOutcome, DiscoveryError>;

    fn is_merge_request(&self, event_kind: &str) -> bool;
}
