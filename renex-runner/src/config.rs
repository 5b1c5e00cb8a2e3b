//! Runner configuration
//!
//! Selects the execution backend and carries the settings each backend needs
//! to start Renovate jobs.

use std::path::PathBuf;

use crate::error::{Result, RunnerError};

/// Execution backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Docker-compatible container engine CLI
    Docker,
    /// Kubernetes cluster through kubectl
    Kubernetes,
}

impl std::str::FromStr for Backend {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" | "podman" => Ok(Backend::Docker),
            "kubernetes" | "k8s" => Ok(Backend::Kubernetes),
            other => Err(RunnerError::Config(format!("unknown runtime '{}'", other))),
        }
    }
}

/// Settings for the Kubernetes backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesConfig {
    /// kubectl binary
    pub kubectl: String,

    /// Namespace pods are created in
    pub namespace: String,

    /// Optional image pull secret name
    pub image_pull_secret: Option<String>,

    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            namespace: "renovate-executor".to_string(),
            image_pull_secret: None,
            cpu_request: "1000m".to_string(),
            cpu_limit: "2000m".to_string(),
            memory_request: "1024Mi".to_string(),
            memory_limit: "2048Mi".to_string(),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Selected backend
    pub backend: Backend,

    /// Renovate image every job runs
    pub image: String,

    /// JSON file with the environment for container jobs
    pub env_path: PathBuf,

    /// Container engine binary (docker or podman)
    pub container_cli: String,

    /// Kubernetes settings, only used by the Kubernetes backend
    pub kubernetes: KubernetesConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Docker,
            image: "renovate/renovate".to_string(),
            env_path: PathBuf::from("./renovate.env.json"),
            container_cli: "docker".to_string(),
            kubernetes: KubernetesConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - RE_RUNTIME (docker | kubernetes, default: docker)
    /// - RE_RENOVATE_IMAGE (default: renovate/renovate)
    /// - RE_RENOVATE_ENV (default: ./renovate.env.json)
    /// - RE_CONTAINER_CLI (default: docker)
    /// - RE_KUBECTL (default: kubectl)
    /// - KUBERNETES_NAMESPACE (default: renovate-executor)
    /// - KUBERNETES_IMAGE_PULL_SECRET
    /// - KUBERNETES_CPU_REQUEST / KUBERNETES_CPU_LIMIT (default: 1000m / 2000m)
    /// - KUBERNETES_MEMORY_REQUEST / KUBERNETES_MEMORY_LIMIT (default: 1024Mi / 2048Mi)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RunnerConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let k8s = KubernetesConfig::default();
        let get = |key: &str, default: String| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(default)
        };

        let backend = match lookup("RE_RUNTIME") {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => defaults.backend,
        };

        Ok(Self {
            backend,
            image: get("RE_RENOVATE_IMAGE", defaults.image),
            env_path: PathBuf::from(get(
                "RE_RENOVATE_ENV",
                defaults.env_path.to_string_lossy().into_owned(),
            )),
            container_cli: get("RE_CONTAINER_CLI", defaults.container_cli),
            kubernetes: KubernetesConfig {
                kubectl: get("RE_KUBECTL", k8s.kubectl),
                namespace: get("KUBERNETES_NAMESPACE", k8s.namespace),
                image_pull_secret: lookup("KUBERNETES_IMAGE_PULL_SECRET")
                    .filter(|value| !value.trim().is_empty()),
                cpu_request: get("KUBERNETES_CPU_REQUEST", k8s.cpu_request),
                cpu_limit: get("KUBERNETES_CPU_LIMIT", k8s.cpu_limit),
                memory_request: get("KUBERNETES_MEMORY_REQUEST", k8s.memory_request),
                memory_limit: get("KUBERNETES_MEMORY_LIMIT", k8s.memory_limit),
            },
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(RunnerError::Config("image cannot be empty".to_string()));
        }

        match self.backend {
            Backend::Docker => {
                if self.container_cli.trim().is_empty() {
                    return Err(RunnerError::Config(
                        "container CLI cannot be empty".to_string(),
                    ));
                }
            }
            Backend::Kubernetes => {
                if self.kubernetes.kubectl.trim().is_empty() {
                    return Err(RunnerError::Config("kubectl cannot be empty".to_string()));
                }
                if self.kubernetes.namespace.trim().is_empty() {
                    return Err(RunnerError::Config("namespace cannot be empty".to_string()));
                }
            }
        }

        Ok(())
    }
}
