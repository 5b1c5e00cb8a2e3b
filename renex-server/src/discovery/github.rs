//! GitHub discovery
//!
//! Scheduled cycles list every repository the token can access
//! (`GET /user/repos`, page by page until an empty page). Webhooks are
//! filtered on their payload first and only then resolved through
//! `GET /repos/{owner}/{repo}`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use renex_core::Repository;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{CheckOutcome, Discovery, DiscoveryError, RepositoryFilter, http_client, unavailable};
use crate::config::DiscoveryConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.github.com";

const EVENT_HEADER: &str = "x-github-event";
const ALLOWED_EVENTS: &[&str] = &["push", "pull_request", "issues"];
const PER_PAGE: u32 = 100;

/// Fields of the REST repository object we use
#[derive(Debug, Deserialize)]
struct GitHubRepository {
    id: u64,
    full_name: String,
    html_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    topics: Option<Vec<String>>,
}

impl From<GitHubRepository> for Repository {
    fn from(repo: GitHubRepository) -> Self {
        Self {
            id: repo.id.to_string(),
            path: repo.full_name,
            url: repo.html_url,
            branch: repo.default_branch,
            topics: repo.topics,
        }
    }
}

/// Discovery backed by the GitHub REST API
pub struct GitHubDiscovery {
    client: Client,
    endpoint: String,
    token: String,
    filter: RepositoryFilter,
}

impl GitHubDiscovery {
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| DiscoveryError::Config("RE_GITHUB_TOKEN is not set".to_string()))?;

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
            .get(format!("{}{}", self.endpoint, path))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn list_page(&self, page: u32) -> Result<Vec<GitHubRepository>, DiscoveryError> {
        self.get("/user/repos")
            .query(&[("per_page", PER_PAGE), ("page", page)])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(unavailable("cannot list GitHub repositories"))?
            .json()
            .await
            .map_err(unavailable("cannot parse GitHub repositories"))
    }

    /// Fetches one repository, `None` if the token cannot see it
    async fn repository(&self, path: &str) -> Result<Option<Repository>, DiscoveryError> {
        let response = self
            .get(&format!("/repos/{}", path))
            .send()
            .await
            .map_err(unavailable("cannot fetch GitHub repository"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let repo: GitHubRepository = response
            .error_for_status()
            .map_err(unavailable("cannot fetch GitHub repository"))?
            .json()
            .await
            .map_err(unavailable("cannot parse GitHub repository"))?;

        Ok(Some(repo.into()))
    }
}

fn payload_str<'a>(payload: &'a JsonValue, pointer: &str) -> Option<&'a str> {
    payload
        .pointer(pointer)
        .and_then(JsonValue::as_str)
        .filter(|value| !value.is_empty())
}

/// Splits `owner/name`, rejecting anything with more or fewer segments
fn split_path(path: &str) -> Option<(&str, &str)> {
    let (owner, name) = path.split_once('/')?;
    (!owner.is_empty() && !name.is_empty() && !name.contains('/')).then_some((owner, name))
}

#[async_trait]
impl Discovery for GitHubDiscovery {
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
        selected.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            "GitHub lists {} repositories over {} pages, {} selected",
            total,
            page - 1,
            selected.len()
        );
        Ok(selected)
    }

    async fn check(
        &self,
        headers: &HeaderMap,
        payload: &JsonValue,
    ) -> Result<CheckOutcome, DiscoveryError> {
        let event_kind = headers
            .get(EVENT_HEADER)
            .ok_or(DiscoveryError::MissingEvent)?
            .to_str()
            .map_err(|_| DiscoveryError::InvalidPayload("unreadable event header".to_string()))?
            .to_string();

        if !ALLOWED_EVENTS.contains(&event_kind.as_str()) {
            return Err(DiscoveryError::EventNotAllowed(event_kind));
        }

        let path = payload_str(payload, "/repository/full_name").ok_or_else(|| {
            DiscoveryError::InvalidPayload("missing repository.full_name".to_string())
        })?;
        let (owner, _) = split_path(path).ok_or_else(|| {
            DiscoveryError::InvalidPayload(format!("malformed repository path '{}'", path))
        })?;

        debug!("Got {} event for {}", event_kind, path);

        let topics: Vec<String> = payload
            .pointer("/repository/topics")
            .and_then(JsonValue::as_array)
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let wanted = self.filter.owner_allowed(owner)
            && self.filter.topics().iter().all(|topic| topics.contains(topic))
            && self.filter.path_allowed(path);

        let repository = if wanted {
            self.repository(path).await?.map(|mut repo| {
                if let Some(branch) = payload_str(payload, "/repository/default_branch") {
                    repo.branch = Some(branch.to_string());
                }
                repo
            })
        } else {
            None
        };

        Ok(CheckOutcome {
            repository,
            event_kind,
        })
    }

    fn is_merge_request(&self, event_kind: &str) -> bool {
        event_kind == "pull_request"
    }
}
