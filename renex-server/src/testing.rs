//! Shared test doubles

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use renex_core::{Batch, BatchId, Repository, WorkClass};
use renex_runner::{Result, Runner, RunnerError};
use serde_json::Value as JsonValue;
use tokio::sync::Notify;

use crate::discovery::{CheckOutcome, Discovery, DiscoveryError};

pub fn repo(id: &str) -> Repository {
    Repository::new(
        id,
        format!("acme/{}", id),
        format!("https://git.example/acme/{}", id),
    )
}

pub fn batch(class: WorkClass, id: &str) -> Batch {
    Batch::single(class, repo(id))
}

#[derive(Default)]
struct FakeState {
    running: HashSet<BatchId>,
    launched: Vec<BatchId>,
    launch_attempts: usize,
    failing_launches: HashSet<BatchId>,
    hanging_launches: HashSet<BatchId>,
    probe_failures: HashMap<BatchId, u32>,
    hanging_probes: HashSet<BatchId>,
    probe_calls: HashMap<BatchId, u32>,
    cleanups: usize,
    failing_cleanup: bool,
    launch_gate: Option<Arc<Notify>>,
}

/// In-memory runner: launched jobs run until [`FakeRunner::finish`] is called
#[derive(Default)]
pub struct FakeRunner {
    state: Mutex<FakeState>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn finish(&self, id: &BatchId) {
        self.with(|s| s.running.remove(id));
    }

    pub fn fail_launch(&self, id: &BatchId) {
        self.with(|s| s.failing_launches.insert(id.clone()));
    }

    pub fn hang_launch(&self, id: &BatchId) {
        self.with(|s| s.hanging_launches.insert(id.clone()));
    }

    /// Makes the next `times` probes of `id` fail
    pub fn fail_probes(&self, id: &BatchId, times: u32) {
        self.with(|s| s.probe_failures.insert(id.clone(), times));
    }

    pub fn hang_probes(&self, id: &BatchId) {
        self.with(|s| s.hanging_probes.insert(id.clone()));
    }

    pub fn fail_cleanup(&self) {
        self.with(|s| s.failing_cleanup = true);
    }

    /// Holds every launch until the returned handle is notified
    pub fn block_launches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with(|s| s.launch_gate = Some(gate.clone()));
        gate
    }

    pub fn launched(&self) -> Vec<BatchId> {
        self.with(|s| s.launched.clone())
    }

    pub fn launch_attempts(&self) -> usize {
        self.with(|s| s.launch_attempts)
    }

    pub fn probe_calls(&self, id: &BatchId) -> u32 {
        self.with(|s| s.probe_calls.get(id).copied().unwrap_or(0))
    }

    pub fn cleanups(&self) -> usize {
        self.with(|s| s.cleanups)
    }
}

#[async_trait]
impl Runner for FakeRunner {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run_job(&self, batch: &Batch) -> Result<()> {
        let (gate, hang) = self.with(|s| {
            s.launch_attempts += 1;
            (s.launch_gate.clone(), s.hanging_launches.contains(&batch.id))
        });

        if let Some(gate) = gate {
            gate.notified().await;
        }
        if hang {
            std::future::pending::<()>().await;
        }

        self.with(|s| {
            if s.failing_launches.contains(&batch.id) {
                return Err(RunnerError::launch(batch, "engine refused the job"));
            }
            s.launched.push(batch.id.clone());
            s.running.insert(batch.id.clone());
            Ok(())
        })
    }

    async fn check_job(&self, batch: &Batch) -> Result<bool> {
        let hang = self.with(|s| {
            *s.probe_calls.entry(batch.id.clone()).or_default() += 1;
            s.hanging_probes.contains(&batch.id)
        });

        if hang {
            std::future::pending::<()>().await;
        }

        self.with(|s| {
            if let Some(remaining) = s.probe_failures.get_mut(&batch.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RunnerError::probe(batch, "backend unreachable"));
                }
            }
            Ok(s.running.contains(&batch.id))
        })
    }

    async fn clean_up(&self) -> Result<()> {
        self.with(|s| {
            s.cleanups += 1;
            if s.failing_cleanup {
                return Err(RunnerError::Cleanup("sweep failed".to_string()));
            }
            Ok(())
        })
    }
}

/// Discovery over a fixed repository list
///
/// Webhooks are resolved GitHub-style: `x-github-event` carries the kind and
/// `repository.full_name` the path.
#[derive(Default)]
pub struct FakeDiscovery {
    repositories: Mutex<Vec<Repository>>,
    failing_fetches: Mutex<u32>,
    fetches: Mutex<u32>,
}

impl FakeDiscovery {
    pub fn new(repositories: Vec<Repository>) -> Arc<Self> {
        Arc::new(Self {
            repositories: Mutex::new(repositories),
            ..Self::default()
        })
    }

    /// Makes the next `times` fetches fail
    pub fn fail_fetches(&self, times: u32) {
        *self.failing_fetches.lock().unwrap() = times;
    }

    pub fn fetches(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl Discovery for FakeDiscovery {
    async fn fetch(&self) -> std::result::Result<Vec<Repository>, DiscoveryError> {
        *self.fetches.lock().unwrap() += 1;

        let mut failing = self.failing_fetches.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(DiscoveryError::Unavailable("host unreachable".to_string()));
        }

        Ok(self.repositories.lock().unwrap().clone())
    }

    async fn check(
        &self,
        headers: &HeaderMap,
        payload: &JsonValue,
    ) -> std::result::Result<CheckOutcome, DiscoveryError> {
        let event_kind = headers
            .get("x-github-event")
            .and_then(|value| value.to_str().ok())
            .ok_or(DiscoveryError::MissingEvent)?
            .to_string();

        if !matches!(event_kind.as_str(), "push" | "pull_request") {
            return Err(DiscoveryError::EventNotAllowed(event_kind));
        }

        let path = payload
            .pointer("/repository/full_name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DiscoveryError::InvalidPayload("missing full_name".to_string()))?;

        let repository = self
            .fetch()
            .await?
            .into_iter()
            .find(|repo| repo.path == path);

        Ok(CheckOutcome {
            repository,
            event_kind,
        })
    }

    fn is_merge_request(&self, event_kind: &str) -> bool {
        event_kind == "pull_request"
    }
}
