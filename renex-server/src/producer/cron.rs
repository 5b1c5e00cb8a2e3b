//! Scheduled producer
//!
//! Cycles fire on a cron schedule (hourly by default, never at startup).
//! Every cycle fetches all repositories from discovery, slices them into
//! consecutive batches and queues each one in the scheduled class. A cycle
//! that keeps failing ends the producer with an error, which takes the
//! process down so its supervisor can restart it.

use std::sync::Arc;
use std::time::Duration;

use ::cron::Schedule;
use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use renex_core::{Batch, BatchError, Repository, WorkClass};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::ProducerConfig;
use crate::discovery::Discovery;
use crate::scheduler::{Admission, Scheduler};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Parses a cron expression
///
/// Accepts the classic five-field form (`minute hour day month weekday`) as
/// well as the six- and seven-field forms with leading seconds.
pub fn parse_schedule(expression: &str) -> Result<Schedule, ::cron::error::Error> {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression).parse()
    } else {
        expression.parse()
    }
}

/// Time from `now` until the schedule next fires, `None` if it never does
pub fn next_delay(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    (next - now).to_std().ok()
}

/// Splits `repositories` into consecutive scheduled batches of at most
/// `batch_size` repositories, preserving order
pub fn slice_batches(
    repositories: Vec<Repository>,
    batch_size: usize,
) -> Result<Vec<Batch>, BatchError> {
    repositories
        .chunks(batch_size.max(1))
        .map(|chunk| Batch::new(WorkClass::Scheduled, chunk.to_vec()))
        .collect()
}

/// What a single cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub repositories: usize,
    pub queued: usize,
    pub duplicates: usize,
}

pub struct CronProducer {
    discovery: Arc<dyn Discovery>,
    scheduler: Arc<Scheduler>,
    config: ProducerConfig,
}

impl CronProducer {
    pub fn new(
        discovery: Arc<dyn Discovery>,
        scheduler: Arc<Scheduler>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            discovery,
            scheduler,
            config,
        }
    }

    /// Fetches, slices and queues once
    pub async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let repositories = self
            .discovery
            .fetch()
            .await
            .context("failed to fetch repositories")?;

        if repositories.is_empty() {
            warn!("No repositories found, nothing to schedule");
            return Ok(CycleReport::default());
        }

        let mut report = CycleReport {
            repositories: repositories.len(),
            ..CycleReport::default()
        };

        for batch in slice_batches(repositories, self.config.batch_size)? {
            match self.scheduler.enqueue(batch) {
                Admission::Queued => report.queued += 1,
                Admission::Duplicate => report.duplicates += 1,
            }
        }

        info!(
            "Scheduled {} repositories in {} batches ({} already queued or running)",
            report.repositories,
            report.queued + report.duplicates,
            report.duplicates
        );

        Ok(report)
    }

    /// Runs a cycle, retrying with exponential backoff up to the configured
    /// number of attempts
    pub async fn run_with_retries(&self) -> anyhow::Result<CycleReport> {
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;
        let mut delay = INITIAL_RETRY_DELAY;

        loop {
            attempt += 1;

            match self.run_cycle().await {
                Ok(report) => {
                    if attempt > 1 {
                        info!("Scheduled cycle succeeded after {} attempt(s)", attempt);
                    }
                    return Ok(report);
                }
                Err(e) => {
                    if attempt >= attempts {
                        error!("Scheduled cycle failed after {} attempts", attempts);
                        return Err(e.context(format!(
                            "scheduled cycle failed after {} attempts",
                            attempts
                        )));
                    }

                    warn!(
                        "Scheduled cycle failed (attempt {}/{}): {:#}. Retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    /// Runs a cycle every time the schedule fires
    ///
    /// Only returns when a cycle exhausted its retries.
    pub async fn run(self) -> anyhow::Result<()> {
        let schedule = parse_schedule(&self.config.schedule)
            .with_context(|| format!("invalid cron schedule '{}'", self.config.schedule))?;

        info!(
            "Scheduled producer started (schedule '{}', {} repositories per batch)",
            self.config.schedule, self.config.batch_size
        );

        loop {
            let Some(delay) = next_delay(&schedule, Utc::now()) else {
                bail!("cron schedule '{}' never fires again", self.config.schedule);
            };

            debug!(
                "Next scheduled cycle in {}",
                humantime::format_duration(Duration::from_secs(delay.as_secs()))
            );
            time::sleep(delay).await;

            self.run_with_retries().await?;
        }
    }
}
