//! Executor configuration
//!
//! Everything is read from `RE_*` environment variables (a `.env` file is
//! loaded first by `main`). Unset or blank variables fall back to defaults;
//! malformed values are rejected so a typo never silently becomes a default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use renex_runner::RunnerConfig;

use crate::discovery::DiscoverySource;
use crate::producer::parse_schedule;

/// Fixed period of the scheduling control loop
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Scheduler limits and timeouts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Concurrency ceiling of the scheduled class
    pub max_scheduled_jobs: usize,

    /// Concurrency ceiling of the event class
    pub max_event_jobs: usize,

    /// Upper bound for a single runner call (launch, probe or cleanup)
    pub call_timeout: Duration,

    /// Consecutive failed probes before an in-flight batch is released
    pub probe_attempts: u32,

    /// Delay before the first probe retry, doubled on every further attempt
    pub probe_backoff: Duration,

    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_scheduled_jobs: 10,
            max_event_jobs: 10,
            call_timeout: Duration::from_secs(60),
            probe_attempts: 3,
            probe_backoff: Duration::from_millis(500),
            tick_interval: TICK_INTERVAL,
        }
    }
}

/// Scheduled producer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Repositories per scheduled batch
    pub batch_size: usize,

    /// Attempts per cycle before the producer gives up
    pub retries: u32,

    /// Cron expression firing scheduled cycles (5 fields, or 6 with seconds)
    pub schedule: String,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retries: 3,
            schedule: "0 * * * *".to_string(),
        }
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub port: u16,

    /// Enables `GET /jobs` and `GET /queue`
    pub api_enabled: bool,

    /// Enables `POST /hook`
    pub webhook_enabled: bool,

    /// Shared secret expected in `x-api-secret` on inspection routes
    pub api_secret: Option<String>,

    /// Secret webhooks are signed (GitHub) or tokenized (GitLab) with
    pub webhook_secret: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            api_enabled: false,
            webhook_enabled: false,
            api_secret: None,
            webhook_secret: None,
        }
    }
}

/// Repository source and its filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub source: DiscoverySource,

    /// Inventory file, read by the inventory source only
    pub repositories_file: PathBuf,

    /// Hosting API base URL, `None` uses the public host
    pub endpoint: Option<String>,

    /// Hosting API token, required by the github and gitlab sources
    pub token: Option<String>,

    /// Owner (organization, group or user) allow-list, empty allows every
    /// owner
    pub owners: Vec<String>,

    /// Topics every repository must carry
    pub topics: Vec<String>,

    /// Explicit `owner/name` allow-list, empty allows every path
    pub repositories: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source: DiscoverySource::default(),
            repositories_file: PathBuf::from("./repositories.json"),
            endpoint: None,
            token: None,
            owners: Vec::new(),
            topics: Vec::new(),
            repositories: Vec::new(),
        }
    }
}

/// Complete executor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub runner: RunnerConfig,
    pub scheduler: SchedulerConfig,
    pub producer: ProducerConfig,
    pub api: ApiConfig,
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Runner variables are documented on [`RunnerConfig::from_env`]. The
    /// executor itself reads:
    /// - RE_BATCH_SIZE (default: 10)
    /// - RE_RETRIES (default: 3)
    /// - RE_CRON_SCHEDULE (cron expression, default: `0 * * * *`)
    /// - RE_MAX_PARALLEL_CRON_JOBS / RE_MAX_PARALLEL_HOOK_JOBS (default: 10)
    /// - RE_CALL_TIMEOUT (humantime, default: 60s)
    /// - RE_PROBE_ATTEMPTS (default: 3)
    /// - RE_API_PORT (default: 4000)
    /// - RE_API_ENABLED / RE_WEBHOOK_ENABLED (default: false)
    /// - RE_API_SECRET, RE_WEBHOOK_SECRET
    /// - RE_HANDLER: inventory (default), github or gitlab
    /// - RE_REPOSITORIES_FILE (default: ./repositories.json)
    /// - RE_GITHUB_TOKEN, RE_GITHUB_ENDPOINT, RE_GITHUB_ORGS, RE_GITHUB_USER
    /// - RE_GITLAB_TOKEN, RE_GITLAB_ENDPOINT, RE_GITLAB_GROUPS, RE_GITLAB_USERS
    /// - RE_OWNERS, RE_TOPICS, RE_REPOSITORIES (comma-separated)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let runner = RunnerConfig::from_lookup(&lookup).context("invalid runner configuration")?;

        let scheduler = SchedulerConfig {
            max_scheduled_jobs: parse_or(
                var("RE_MAX_PARALLEL_CRON_JOBS"),
                "RE_MAX_PARALLEL_CRON_JOBS",
                defaults.scheduler.max_scheduled_jobs,
            )?,
            max_event_jobs: parse_or(
                var("RE_MAX_PARALLEL_HOOK_JOBS"),
                "RE_MAX_PARALLEL_HOOK_JOBS",
                defaults.scheduler.max_event_jobs,
            )?,
            call_timeout: duration_or(
                var("RE_CALL_TIMEOUT"),
                "RE_CALL_TIMEOUT",
                defaults.scheduler.call_timeout,
            )?,
            probe_attempts: parse_or(
                var("RE_PROBE_ATTEMPTS"),
                "RE_PROBE_ATTEMPTS",
                defaults.scheduler.probe_attempts,
            )?,
            ..defaults.scheduler
        };

        let producer = ProducerConfig {
            batch_size: parse_or(
                var("RE_BATCH_SIZE"),
                "RE_BATCH_SIZE",
                defaults.producer.batch_size,
            )?,
            retries: parse_or(var("RE_RETRIES"), "RE_RETRIES", defaults.producer.retries)?,
            schedule: var("RE_CRON_SCHEDULE")
                .map(|value| value.trim().to_string())
                .unwrap_or(defaults.producer.schedule),
        };
        parse_schedule(&producer.schedule).with_context(|| {
            format!("RE_CRON_SCHEDULE is not a cron expression: '{}'", producer.schedule)
        })?;

        let api = ApiConfig {
            port: parse_or(var("RE_API_PORT"), "RE_API_PORT", defaults.api.port)?,
            api_enabled: flag(var("RE_API_ENABLED")),
            webhook_enabled: flag(var("RE_WEBHOOK_ENABLED")),
            api_secret: var("RE_API_SECRET"),
            webhook_secret: var("RE_WEBHOOK_SECRET"),
        };

        let source = parse_or(
            var("RE_HANDLER"),
            "RE_HANDLER",
            defaults.discovery.source,
        )?;

        let mut owners = list(var("RE_OWNERS"));
        let (token, endpoint) = match source {
            DiscoverySource::Inventory => (None, None),
            DiscoverySource::GitHub => {
                owners.extend(list(var("RE_GITHUB_ORGS")));
                owners.extend(list(var("RE_GITHUB_USER")));
                (var("RE_GITHUB_TOKEN"), var("RE_GITHUB_ENDPOINT"))
            }
            DiscoverySource::GitLab => {
                owners.extend(list(var("RE_GITLAB_GROUPS")));
                owners.extend(list(var("RE_GITLAB_USERS")));
                (var("RE_GITLAB_TOKEN"), var("RE_GITLAB_ENDPOINT"))
            }
        };

        let discovery = DiscoveryConfig {
            source,
            repositories_file: var("RE_REPOSITORIES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.discovery.repositories_file),
            endpoint,
            token,
            owners,
            topics: list(var("RE_TOPICS")),
            repositories: list(var("RE_REPOSITORIES")),
        };

        Ok(Self {
            runner,
            scheduler,
            producer,
            api,
            discovery,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.runner.validate()?;

        if self.scheduler.max_scheduled_jobs == 0 {
            bail!("RE_MAX_PARALLEL_CRON_JOBS must be at least 1");
        }
        if self.scheduler.max_event_jobs == 0 {
            bail!("RE_MAX_PARALLEL_HOOK_JOBS must be at least 1");
        }
        if self.scheduler.call_timeout.is_zero() {
            bail!("RE_CALL_TIMEOUT must be greater than zero");
        }
        if self.scheduler.probe_attempts == 0 {
            bail!("RE_PROBE_ATTEMPTS must be at least 1");
        }
        if self.producer.batch_size == 0 {
            bail!("RE_BATCH_SIZE must be at least 1");
        }
        if self.producer.retries == 0 {
            bail!("RE_RETRIES must be at least 1");
        }
        parse_schedule(&self.producer.schedule)
            .with_context(|| format!("invalid RE_CRON_SCHEDULE '{}'", self.producer.schedule))?;
        if let Some(token_var) = self.discovery.source.token_var() {
            if self.discovery.token.is_none() {
                bail!("{} must be set when RE_HANDLER={}", token_var, self.discovery.source);
            }
        }

        Ok(())
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, value)),
        None => Ok(default),
    }
}

fn duration_or(value: Option<String>, key: &str, default: Duration) -> anyhow::Result<Duration> {
    match value {
        Some(value) => humantime::parse_duration(value.trim())
            .with_context(|| format!("{} is not a duration: '{}'", key, value)),
        None => Ok(default),
    }
}

fn flag(value: Option<String>) -> bool {
    value.is_some_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        )
    })
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use renex_runner::Backend;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.producer.batch_size, 10);
        assert_eq!(config.producer.schedule, "0 * * * *");
        assert_eq!(config.discovery.source, DiscoverySource::Inventory);
        assert_eq!(config.scheduler.call_timeout, Duration::from_secs(60));
        assert_eq!(config.scheduler.tick_interval, Duration::from_secs(5));
        assert_eq!(config.api.port, 4000);
        assert!(!config.api.api_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_environment() {
        let config = Config::from_lookup(lookup(&[
            ("RE_RUNTIME", "kubernetes"),
            ("RE_BATCH_SIZE", "25"),
            ("RE_RETRIES", "5"),
            ("RE_CRON_SCHEDULE", "*/30 * * * *"),
            ("RE_MAX_PARALLEL_CRON_JOBS", "4"),
            ("RE_MAX_PARALLEL_HOOK_JOBS", "2"),
            ("RE_CALL_TIMEOUT", "90s"),
            ("RE_PROBE_ATTEMPTS", "5"),
            ("RE_API_PORT", "8080"),
            ("RE_API_ENABLED", "true"),
            ("RE_WEBHOOK_ENABLED", "TRUE"),
            ("RE_API_SECRET", "hunter2"),
            ("RE_WEBHOOK_SECRET", "whsec"),
            ("RE_REPOSITORIES_FILE", "/etc/renex/repos.json"),
            ("RE_OWNERS", "acme, globex,"),
            ("RE_TOPICS", "renovate"),
            ("RE_REPOSITORIES", "acme/api"),
        ]))
        .unwrap();

        assert_eq!(config.runner.backend, Backend::Kubernetes);
        assert_eq!(config.producer.batch_size, 25);
        assert_eq!(config.producer.retries, 5);
        assert_eq!(config.producer.schedule, "*/30 * * * *");
        assert_eq!(config.scheduler.max_scheduled_jobs, 4);
        assert_eq!(config.scheduler.max_event_jobs, 2);
        assert_eq!(config.scheduler.call_timeout, Duration::from_secs(90));
        assert_eq!(config.scheduler.probe_attempts, 5);
        assert_eq!(config.api.port, 8080);
        assert!(config.api.api_enabled);
        assert!(config.api.webhook_enabled);
        assert_eq!(config.api.api_secret.as_deref(), Some("hunter2"));
        assert_eq!(config.api.webhook_secret.as_deref(), Some("whsec"));
        assert_eq!(
            config.discovery.repositories_file,
            PathBuf::from("/etc/renex/repos.json")
        );
        assert_eq!(config.discovery.owners, vec!["acme", "globex"]);
        assert_eq!(config.discovery.topics, vec!["renovate"]);
        assert_eq!(config.discovery.repositories, vec!["acme/api"]);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("RE_BATCH_SIZE", "ten")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RE_CRON_SCHEDULE", "hourly")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RE_CRON_SCHEDULE", "61 * * * *")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RE_HANDLER", "bitbucket")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RE_CALL_TIMEOUT", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RE_API_PORT", "99999")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RE_RUNTIME", "nomad")])).is_err());
    }

    #[test]
    fn test_github_source() {
        let config = Config::from_lookup(lookup(&[
            ("RE_HANDLER", "github"),
            ("RE_GITHUB_TOKEN", "ghp_x"),
            ("RE_GITHUB_ENDPOINT", "https://ghe.example/api/v3"),
            ("RE_GITHUB_ORGS", "acme"),
            ("RE_GITHUB_USER", "wile"),
            ("RE_GITLAB_GROUPS", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.discovery.source, DiscoverySource::GitHub);
        assert_eq!(config.discovery.token.as_deref(), Some("ghp_x"));
        assert_eq!(
            config.discovery.endpoint.as_deref(),
            Some("https://ghe.example/api/v3")
        );
        assert_eq!(config.discovery.owners, vec!["acme", "wile"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gitlab_source_requires_token() {
        let config = Config::from_lookup(lookup(&[
            ("RE_HANDLER", "GitLab"),
            ("RE_GITLAB_GROUPS", "platform"),
            ("RE_GITLAB_USERS", "alice"),
        ]))
        .unwrap();

        assert_eq!(config.discovery.source, DiscoverySource::GitLab);
        assert_eq!(config.discovery.endpoint, None);
        assert_eq!(config.discovery.owners, vec!["platform", "alice"]);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RE_GITLAB_TOKEN"));
    }

    #[test]
    fn test_blank_secret_means_no_secret() {
        let config = Config::from_lookup(lookup(&[
            ("RE_API_SECRET", "  "),
            ("RE_WEBHOOK_SECRET", ""),
        ]))
        .unwrap();
        assert_eq!(config.api.api_secret, None);
        assert_eq!(config.api.webhook_secret, None);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.producer.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.max_event_jobs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.probe_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.producer.schedule = "every hour".to_string();
        assert!(config.validate().is_err());
    }
}
