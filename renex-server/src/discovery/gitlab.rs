//! GitLab discovery
//!
//! Scheduled cycles page through `GET /api/v4/projects`, narrowed to the
//! configured topics on the server side. Webhook payloads carry no topics,
//! so accepted events are resolved through `GET /api/v4/projects/{id}` and
//! filtered on the fetched project.

use async_trait::async_trait;
use axum::http::HeaderMap;
use renex_core::Repository;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::{CheckOutcome, Discovery, DiscoveryError, RepositoryFilter, http_client, unavailable};
use crate::config::DiscoveryConfig;

pub const DEFAULT_ENDPOINT: &str = "https://gitlab.com";

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const ALLOWED_EVENTS: &[&str] = &["push", "merge_request", "issue"];
const PER_PAGE: &str = "100";

/// Fields of the REST project object we use
#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: u64,
    path_with_namespace: String,
    web_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    topics: Option<Vec<String>>,
}

impl From<GitLabProject> for Repository {
    fn from(project: GitLabProject) -> Self {
        Self {
            id: project.id.to_string(),
            path: project.path_with_namespace,
            url: project.web_url,
            branch: project.default_branch,
            topics: project.topics,
        }
    }
}

/// Discovery backed by the GitLab REST API
pub struct GitLabDiscovery {
    client: Client,
    endpoint: String,
    token: String,
    filter: RepositoryFilter,
}

impl GitLabDiscovery {
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| DiscoveryError::Config("RE_GITLAB_TOKEN is not set".to_string()))?;

        Ok(Self {
            client: http_client()?,
            endpoint: config
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            token,
            filter: RepositoryFilter::new(config),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/api/v4{}", self.endpoint, path))
            .header(TOKEN_HEADER, &self.token)
    }

    async fn list_page(&self, page: u32) -> Result<Vec<GitLabProject>, DiscoveryError> {
        let page = page.to_string();
        let mut query = vec![("per_page", PER_PAGE), ("page", page.as_str())];
        let topics = self.filter.topics().join(",");
        if !topics.is_empty() {
            query.push(("topic", topics.as_str()));
        }

        self.get("/projects")
            .query(&query)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(unavailable("cannot list GitLab projects"))?
            .json()
            .await
            .map_err(unavailable("cannot parse GitLab projects"))
    }

    async fn project(&self, id: u64) -> Result<Repository, reqwest::Error> {
        let project: GitLabProject = self
            .get(&format!("/projects/{}", id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(project.into())
    }
}

/// Sorts numerically by project id, ids that are not numbers go last
fn sort_by_id(repositories: &mut [Repository]) {
    repositories.sort_by_key(|repo| (repo.id.parse::<u64>().unwrap_or(u64::MAX), repo.id.clone()));
}

#[async_trait]
impl Discovery for GitLabDiscovery {
    async fn fetch(&self) -> Result<Vec<Repository>, DiscoveryError> {
        let mut repositories = Vec::new();
        let mut page = 1;

        loop {
            let batch = self.list_page(page).await?;
            if batch.is_empty() {
                break;
            }
            repositories.extend(batch.into_iter().map(Repository::from));
            page += 1;
        }

        let total = repositories.len();
        let mut selected = self.filter.select(repositories);
        sort_by_id(&mut selected);

        debug!(
            "GitLab lists {} projects over {} pages, {} selected",
            total,
            page - 1,
            selected.len()
        );
        Ok(selected)
    }

    async fn check(
        &self,
        _headers: &HeaderMap,
        payload: &JsonValue,
    ) -> Result<CheckOutcome, DiscoveryError> {
        let event_kind = payload
            .get("object_kind")
            .and_then(JsonValue::as_str)
            .ok_or(DiscoveryError::MissingEvent)?
            .to_string();

        if !ALLOWED_EVENTS.contains(&event_kind.as_str()) {
            return Err(DiscoveryError::EventNotAllowed(event_kind));
        }

        let path = payload
            .pointer("/project/path_with_namespace")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                DiscoveryError::InvalidPayload("missing project.path_with_namespace".to_string())
            })?;
        let id = payload
            .pointer("/project/id")
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| DiscoveryError::InvalidPayload("missing project.id".to_string()))?;

        debug!("Got {} event for {}", event_kind, path);

        let ignored = CheckOutcome {
            repository: None,
            event_kind: event_kind.clone(),
        };

        let owner = path.split('/').next().unwrap_or_default();
        if !self.filter.owner_allowed(owner) || !self.filter.path_allowed(path) {
            return Ok(ignored);
        }

        let repository = match self.project(id).await {
            Ok(repository) => repository,
            Err(e) => {
                warn!("Cannot fetch GitLab project {}: {}", id, e);
                return Ok(ignored);
            }
        };

        if !repository.has_topics(self.filter.topics()) {
            return Ok(ignored);
        }

        Ok(CheckOutcome {
            repository: Some(repository),
            event_kind,
        })
    }

    fn is_merge_request(&self, event_kind: &str) -> bool {
        event_kind == "merge_request"
    }
}
