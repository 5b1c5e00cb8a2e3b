//! Container engine backend
//!
//! Runs each batch as one detached, auto-removed container through a
//! Docker-compatible CLI (`docker` or `podman`):
//! - pulling the Renovate image once at startup, then `--pull=missing`
//! - passing the Renovate environment through the child process, never argv,
//!   minus the variables that steer the engine CLI itself
//! - bind-mounting the optional Renovate config file read-only
//! - probing containers by name

use std::path::PathBuf;

use async_trait::async_trait;
use renex_core::Batch;
use tracing::{debug, info, warn};

use crate::Runner;
use crate::command::ExternalCommand;
use crate::environment::RenovateEnv;
use crate::error::{Result, RunnerError};

/// Variables that change how the engine CLI itself behaves
///
/// They are never exported to the CLI process, so an environment file cannot
/// point it at another daemon or binary.
const ENGINE_VARIABLES: &[&str] = &["PATH", "HOME", "TMPDIR", "KUBECONFIG", "CONTAINER_HOST"];
const ENGINE_PREFIXES: &[&str] = &["DOCKER_", "CONTAINERS_", "PODMAN_", "XDG_", "LD_"];

fn affects_engine(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    ENGINE_VARIABLES.contains(&key.as_str())
        || ENGINE_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

/// Runner backed by a Docker-compatible container engine
pub struct ContainerRunner {
    /// CLI binary, e.g. `docker` or `podman`
    cli: String,
    image: String,
    env_path: PathBuf,
}

impl ContainerRunner {
    /// Creates a new container runner
    ///
    /// # Arguments
    /// * `cli` - Container engine binary
    /// * `image` - Renovate image to run
    /// * `env_path` - JSON environment file passed to every job
    pub fn new(cli: String, image: String, env_path: PathBuf) -> Self {
        Self {
            cli,
            image,
            env_path,
        }
    }

    /// Builds the `run` command for a batch
    ///
    /// Variables are listed as bare `-e KEY` flags; the engine reads their
    /// values from its own environment, which is the child's.
    pub fn run_command(&self, batch: &Batch, env: &RenovateEnv) -> ExternalCommand {
        let mut cmd = ExternalCommand::new(&self.cli)
            .args(["run", "-d", "--rm", "--pull=missing", "--name"])
            .arg(batch.job_name())
            .arg("--label")
            .arg(format!("batchId={}", batch.id))
            .arg("--label")
            .arg(format!("workClass={}", batch.class));

        if let Some(mount) = env.config_mount() {
            cmd = cmd.arg("--mount").arg(mount.to_mount_arg());
        }

        for (key, value) in env.iter() {
            if affects_engine(key) {
                warn!("Not passing {} to {}: it would change the engine CLI", key, self.cli);
                continue;
            }
            cmd = cmd.arg("-e").arg(key).env(key, value);
        }

        cmd.arg(&self.image)
    }

    async fn pull_image(&self) -> std::result::Result<(), String> {
        debug!("Pulling image {}", self.image);

        let output = ExternalCommand::new(&self.cli)
            .args(["pull", self.image.as_str()])
            .output()
            .await
            .map_err(|e| format!("failed to execute {} pull: {}", self.cli, e))?;

        if !output.success() {
            return Err(format!(
                "failed to pull image {}: {}",
                self.image,
                output.failure_summary()
            ));
        }

        Ok(())
    }
}

/// Interprets `container inspect --format {{.State.Running}}` output
fn parse_running_state(stdout: &str) -> Option<bool> {
    match stdout.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("no such")
}

#[async_trait]
impl Runner for ContainerRunner {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn verify(&self) -> Result<()> {
        let output = ExternalCommand::new(&self.cli)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                RunnerError::Config(format!(
                    "failed to execute '{} --version'. Is it installed? {}",
                    self.cli, e
                ))
            })?;

        if !output.success() {
            return Err(RunnerError::Config(format!(
                "{} is not working correctly: {}",
                self.cli,
                output.failure_summary()
            )));
        }

        info!("Container engine is available: {}", output.stdout.trim());

        // launches fall back to `--pull=missing`, so a failed pull is not fatal
        if let Err(e) = self.pull_image().await {
            warn!("{}", e);
        }
        Ok(())
    }

    async fn run_job(&self, batch: &Batch) -> Result<()> {
        let env = RenovateEnv::load(&self.env_path)
            .await
            .map_err(|e| RunnerError::launch(batch, e))?
            .with_repositories(batch);

        let output = self
            .run_command(batch, &env)
            .output()
            .await
            .map_err(|e| {
                RunnerError::launch(batch, format!("failed to execute {} run: {}", self.cli, e))
            })?;

        if !output.success() {
            return Err(RunnerError::launch(batch, output.failure_summary()));
        }

        info!(
            "Container {} started with ID {}",
            batch.job_name(),
            output.stdout.trim()
        );
        Ok(())
    }

    async fn check_job(&self, batch: &Batch) -> Result<bool> {
        let name = batch.job_name();
        let output = ExternalCommand::new(&self.cli)
            .args([
                "container",
                "inspect",
                "--format",
                "{{.State.Running}}",
                name.as_str(),
            ])
            .output()
            .await
            .map_err(|e| {
                RunnerError::probe(
                    batch,
                    format!("failed to execute {} inspect: {}", self.cli, e),
                )
            })?;

        if output.success() {
            return parse_running_state(&output.stdout).ok_or_else(|| {
                RunnerError::probe(
                    batch,
                    format!("unexpected inspect output '{}'", output.stdout.trim()),
                )
            });
        }

        if is_missing_container(&output.stderr) {
            debug!("Container {} no longer exists", name);
            return Ok(false);
        }

        Err(RunnerError::probe(batch, output.failure_summary()))
    }
}
