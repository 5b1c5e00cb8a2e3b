//! Inventory-file discovery
//!
//! Repositories are listed in a JSON file maintained next to the executor:
//!
//! ```json
//! [
//!   { "id": "1296269", "path": "acme/api", "url": "https://github.com/acme/api",
//!     "branch": "main", "topics": ["renovate"] }
//! ]
//! ```
//!
//! The file is re-read on every fetch so edits apply on the next cycle
//! without a restart.

use async_trait::async_trait;
use axum::http::HeaderMap;
use renex_core::Repository;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{CheckOutcome, Discovery, DiscoveryError, RepositoryFilter};
use crate::config::DiscoveryConfig;

const GITHUB_EVENT_HEADER: &str = "x-github-event";
const GITLAB_EVENT_HEADER: &str = "x-gitlab-event";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    GitHub,
    GitLab,
}

impl Provider {
    fn allowed_events(self) -> &'static [&'static str] {
        match self {
            Provider::GitHub => &["push", "pull_request", "issues"],
            Provider::GitLab => &["push", "merge_request", "issue"],
        }
    }

    fn repository_path(self, payload: &JsonValue) -> Option<&str> {
        let pointer = match self {
            Provider::GitHub => "/repository/full_name",
            Provider::GitLab => "/project/path_with_namespace",
        };
        payload.pointer(pointer).and_then(JsonValue::as_str)
    }

    fn default_branch(self, payload: &JsonValue) -> Option<&str> {
        let pointer = match self {
            Provider::GitHub => "/repository/default_branch",
            Provider::GitLab => "/project/default_branch",
        };
        payload
            .pointer(pointer)
            .and_then(JsonValue::as_str)
            .filter(|branch| !branch.is_empty())
    }
}

/// Works out which host sent a webhook and the event kind it carries
fn identify(
    headers: &HeaderMap,
    payload: &JsonValue,
) -> Result<(Provider, String), DiscoveryError> {
    if let Some(event) = headers.get(GITHUB_EVENT_HEADER) {
        let event = event
            .to_str()
            .map_err(|_| DiscoveryError::InvalidPayload("unreadable event header".to_string()))?;
        return Ok((Provider::GitHub, event.to_string()));
    }

    let object_kind = payload.get("object_kind").and_then(JsonValue::as_str);
    if headers.contains_key(GITLAB_EVENT_HEADER) || object_kind.is_some() {
        let kind = object_kind
            .ok_or_else(|| DiscoveryError::InvalidPayload("missing object_kind".to_string()))?;
        return Ok((Provider::GitLab, kind.to_string()));
    }

    Err(DiscoveryError::MissingEvent)
}

/// Discovery backed by a JSON inventory file
pub struct InventoryDiscovery {
    config: DiscoveryConfig,
    filter: RepositoryFilter,
}

impl InventoryDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            filter: RepositoryFilter::new(&config),
            config,
        }
    }

    async fn load(&self) -> Result<Vec<Repository>, DiscoveryError> {
        let path = &self.config.repositories_file;
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DiscoveryError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            DiscoveryError::Unavailable(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Applies the filters, drops repeated paths and sorts by path
    pub fn select(&self, repositories: Vec<Repository>) -> Vec<Repository> {
        let mut selected = self.filter.select(repositories);
        selected.sort_by(|a, b| a.path.cmp(&b.path));
        selected
    }
}

#[async_trait]
impl Discovery for InventoryDiscovery {
    async fn fetch(&self) -> Result<Vec<Repository>, DiscoveryError> {
        let repositories = self.load().await?;
        let total = repositories.len();
        let selected = self.select(repositories);

        debug!(
            "Inventory lists {} repositories, {} selected",
            total,
            selected.len()
        );
        Ok(selected)
    }

    async fn check(
        &self,
        headers: &HeaderMap,
        payload: &JsonValue,
    ) -> Result<CheckOutcome, DiscoveryError> {
        let (provider, event_kind) = identify(headers, payload)?;

        if !provider.allowed_events().contains(&event_kind.as_str()) {
            return Err(DiscoveryError::EventNotAllowed(event_kind));
        }

        let path = provider.repository_path(payload).ok_or_else(|| {
            DiscoveryError::InvalidPayload("missing repository path".to_string())
        })?;

        debug!("Got {} event for {}", event_kind, path);

        let repository = self
            .fetch()
            .await?
            .into_iter()
            .find(|repo| repo.path.eq_ignore_ascii_case(path))
            .map(|mut repo| {
                if let Some(branch) = provider.default_branch(payload) {
                    repo.branch = Some(branch.to_string());
                }
                repo
            });

        Ok(CheckOutcome {
            repository,
            event_kind,
        })
    }

    fn is_merge_request(&self, event_kind: &str) -> bool {
        matches!(event_kind, "pull_request" | "merge_request")
    }
}
