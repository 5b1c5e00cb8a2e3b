//! Repository domain model

use serde::{Deserialize, Serialize};

/// A version-control project that Renovate should check for updates
///
/// Produced by repository discovery and consumed read-only by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Stable unique identifier assigned by the source-control host
    pub id: String,

    /// Canonical `owner/name` path
    pub path: String,

    /// Browser URL of the repository
    pub url: String,

    /// Branch to check, `None` means the host's default branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Topic labels set on the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
}

impl Repository {
    /// Creates a repository on the default branch with no topics
    pub fn new(id: impl Into<String>, path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            url: url.into(),
            branch: None,
            topics: None,
        }
    }

    /// Returns the owner segment of the path (everything before the first `/`)
    pub fn owner(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }

    /// Returns true if the repository carries every one of `required` topics
    pub fn has_topics(&self, required: &[String]) -> bool {
        let topics = self.topics.as_deref().unwrap_or_default();
        required.iter().all(|topic| topics.contains(topic))
    }
}
