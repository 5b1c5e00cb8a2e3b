//! Renovate job environment
//!
//! Container jobs receive their whole Renovate configuration as environment
//! variables, read from a JSON file of string values. The repositories of the
//! batch are appended as `RENOVATE_REPOSITORIES`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use renex_core::Batch;

/// Variable holding the JSON list of repository paths
pub const REPOSITORIES_VAR: &str = "RENOVATE_REPOSITORIES";

/// Variable pointing at an optional Renovate config file on the host
pub const CONFIG_FILE_VAR: &str = "RENOVATE_CONFIG_FILE";

/// Directory the config file is mounted into inside the Renovate image
const CONFIG_MOUNT_DIR: &str = "/usr/src/app";

/// JSON array of the batch's repository paths
pub fn repositories_value(batch: &Batch) -> String {
    serde_json::Value::from(batch.paths()).to_string()
}

/// Environment variables for a Renovate job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenovateEnv {
    vars: BTreeMap<String, String>,
}

impl RenovateEnv {
    /// Loads the environment file at `path`
    pub async fn load(path: &Path) -> Result<Self, String> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            format!(
                "Renovate environment file {} not readable: {}",
                path.display(),
                e
            )
        })?;

        Self::parse(&content).map_err(|e| {
            format!(
                "Renovate environment file {} is not a JSON object of strings: {}",
                path.display(),
                e
            )
        })
    }

    /// Parses a JSON object of string values
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let vars = serde_json::from_str(content)?;
        Ok(Self { vars })
    }

    /// Adds the batch's repositories, replacing any value from the file
    pub fn with_repositories(mut self, batch: &Batch) -> Self {
        self.vars
            .insert(REPOSITORIES_VAR.to_string(), repositories_value(batch));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Bind mount for the Renovate config file, if one is configured
    pub fn config_mount(&self) -> Option<BindMount> {
        let file = self.get(CONFIG_FILE_VAR)?;
        if file.trim().is_empty() {
            return None;
        }

        let source = std::path::absolute(file).ok()?;
        let name = source.file_name()?.to_string_lossy().into_owned();

        Some(BindMount {
            target: format!("{}/{}", CONFIG_MOUNT_DIR, name),
            source,
        })
    }
}

/// A read-only host file mounted into the job container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
}

impl BindMount {
    /// Value for the container CLI's `--mount` flag
    pub fn to_mount_arg(&self) -> String {
        format!(
            "type=bind,source={},target={},readonly",
            self.source.display(),
            self.target
        )
    }
}
