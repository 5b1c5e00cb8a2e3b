//! Batch domain types
//!
//! A batch is the unit of schedulable work: one or more repositories that
//! are checked by a single backend job. Its identity is derived from its
//! content and doubles as the deduplication key of the scheduler.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::domain::repository::Repository;

/// Errors raised while building a batch
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// A batch must contain at least one repository
    #[error("a batch needs at least one repository")]
    Empty,
}

/// Class of work a batch belongs to
///
/// Each class owns its own queue and concurrency ceiling, so periodic sweeps
/// and webhook bursts never compete for the same slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkClass {
    /// Created by the periodic producer
    Scheduled,
    /// Created by a webhook event
    Event,
}

impl WorkClass {
    /// Both classes, in processing order
    pub const ALL: [WorkClass; 2] = [WorkClass::Scheduled, WorkClass::Event];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkClass::Scheduled => "scheduled",
            WorkClass::Event => "event",
        }
    }
}

impl std::fmt::Display for WorkClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" | "cron" => Ok(WorkClass::Scheduled),
            "event" | "hook" => Ok(WorkClass::Event),
            other => Err(format!("unknown work class '{}'", other)),
        }
    }
}

/// Content-derived batch identity (40 lowercase hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the identity of an ordered repository list
///
/// SHA-1 over the repository ids joined with `,`. The result depends on the
/// order of `repositories`: the same set in a different order is a different
/// batch.
pub fn batch_id(repositories: &[Repository]) -> BatchId {
    let joined = repositories
        .iter()
        .map(|repo| repo.id.as_str())
        .collect::<Vec<_>>()
        .join(",");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    BatchId(hex::encode(hasher.finalize()))
}

/// A group of repositories launched as one backend job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub repositories: Vec<Repository>,
    #[serde(rename = "type")]
    pub class: WorkClass,
}

impl Batch {
    /// Builds a batch and derives its identity
    pub fn new(class: WorkClass, repositories: Vec<Repository>) -> Result<Self, BatchError> {
        if repositories.is_empty() {
            return Err(BatchError::Empty);
        }

        Ok(Self {
            id: batch_id(&repositories),
            repositories,
            class,
        })
    }

    /// Builds a batch for exactly one repository
    pub fn single(class: WorkClass, repository: Repository) -> Self {
        Self {
            id: batch_id(std::slice::from_ref(&repository)),
            repositories: vec![repository],
            class,
        }
    }

    /// Paths of the repositories in batch order
    pub fn paths(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.path.as_str()).collect()
    }

    /// Name used for the backend job (container or pod) of this batch
    pub fn job_name(&self) -> String {
        format!("renovate-{}-{}", self.class, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(id: &str) -> Repository {
        Repository::new(id, format!("acme/{}", id), format!("https://git.example/acme/{}", id))
    }

    #[test]
    fn test_batch_id_is_deterministic() {
        let repos = vec![repo("1"), repo("2"), repo("3")];
        assert_eq!(batch_id(&repos), batch_id(&repos));
        assert_eq!(batch_id(&repos), batch_id(&repos.clone()));
    }

    #[test]
    fn test_batch_id_matches_sha1_of_joined_ids() {
        // sha1("1,2")
        let id = batch_id(&[repo("1"), repo("2")]);
        assert_eq!(id.as_str(), "2219fecb861ae82ba2706e49a065c8d155e9f2a6");
    }

    #[test]
    fn test_batch_id_is_order_sensitive() {
        let forward = batch_id(&[repo("1"), repo("2")]);
        let reverse = batch_id(&[repo("2"), repo("1")]);
        assert_ne!(forward, reverse);
    }

    #[test]
    fn test_batch_id_ignores_non_id_fields() {
        let mut moved = repo("1");
        moved.path = "other/place".to_string();
        assert_eq!(batch_id(&[repo("1")]), batch_id(&[moved]));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert_eq!(Batch::new(WorkClass::Scheduled, vec![]), Err(BatchError::Empty));
    }

    #[test]
    fn test_single_matches_new() {
        let single = Batch::single(WorkClass::Event, repo("9"));
        let built = Batch::new(WorkClass::Event, vec![repo("9")]).unwrap();
        assert_eq!(single, built);
    }

    #[test]
    fn test_job_name_includes_class() {
        let batch = Batch::single(WorkClass::Scheduled, repo("1"));
        assert_eq!(batch.job_name(), format!("renovate-scheduled-{}", batch.id));
    }

    #[test]
    fn test_work_class_parse() {
        assert_eq!("scheduled".parse::<WorkClass>(), Ok(WorkClass::Scheduled));
        assert_eq!("hook".parse::<WorkClass>(), Ok(WorkClass::Event));
        assert!("nightly".parse::<WorkClass>().is_err());
    }

    #[test]
    fn test_batch_serializes_class_as_type() {
        let batch = Batch::single(WorkClass::Event, repo("1"));
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["id"], batch.id.as_str());
    }
}
