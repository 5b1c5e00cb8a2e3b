//! Renex Runner
//!
//! Backend abstraction that launches and probes Renovate jobs.
//!
//! Architecture:
//! - [`Runner`]: the capability the scheduler consumes (start, probe, clean up)
//! - [`ContainerRunner`]: one auto-removed container per batch via a
//!   Docker-compatible CLI (docker or podman)
//! - [`KubernetesRunner`]: one pod per batch via `kubectl`
//! - [`create_runner`]: picks a backend from [`RunnerConfig`]
//!
//! Backends convert every process or transport failure into a
//! [`RunnerError`]; nothing backend-specific crosses into the scheduler.

pub mod command;
pub mod config;
pub mod docker;
pub mod environment;
pub mod error;
pub mod kubernetes;

pub use config::{Backend, KubernetesConfig, RunnerConfig};
pub use docker::ContainerRunner;
pub use error::{Result, RunnerError};
pub use kubernetes::KubernetesRunner;

use async_trait::async_trait;
use renex_core::Batch;
use std::sync::Arc;
use tracing::info;

/// Capability to run Renovate batches on some execution backend
#[async_trait]
pub trait Runner: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Checks that the backend tooling is reachable
    ///
    /// Called once at startup.
    async fn verify(&self) -> Result<()> {
        Ok(())
    }

    /// Starts the job for `batch`
    ///
    /// Returns once the job is observable on the backend. An error means no
    /// job was started.
    async fn run_job(&self, batch: &Batch) -> Result<()>;

    /// Probes the job for `batch`
    ///
    /// `Ok(true)` while the job runs. `Ok(false)` once it finished, failed or
    /// cannot be found. `Err` only for transient probe failures.
    async fn check_job(&self, batch: &Batch) -> Result<bool>;

    /// Backend-wide housekeeping, invoked once per scheduling tick
    async fn clean_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Creates the runner selected by `config`
pub fn create_runner(config: &RunnerConfig) -> Result<Arc<dyn Runner>> {
    config.validate()?;

    let runner: Arc<dyn Runner> = match config.backend {
        Backend::Docker => Arc::new(ContainerRunner::new(
            config.container_cli.clone(),
            config.image.clone(),
            config.env_path.clone(),
        )),
        Backend::Kubernetes => Arc::new(KubernetesRunner::new(
            config.image.clone(),
            config.kubernetes.clone(),
        )),
    };

    info!("Using {} runner with image {}", runner.name(), config.image);

    Ok(runner)
}
