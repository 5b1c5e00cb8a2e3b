//! Scheduler
//!
//! Owns one queue and one concurrency ceiling per work class and drives the
//! runner from a periodic tick:
//! 1. Reconcile: probe in-flight batches and release the finished ones
//! 2. Admit: launch queued batches while the class has free slots
//! 3. Clean up: one backend-wide sweep after both classes
//!
//! Each class has its own pass guard, so a class whose backend hangs only
//! skips its own passes while the other class keeps admitting. Probes and
//! launches within a pass run concurrently.
//!
//! Class state sits behind a plain mutex that is never held across an
//! `.await`; runner calls always happen outside of it.

mod class;


pub use class::Admission;
use class::ClassState;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use renex_core::dto::jobs::{JobsResponse, QueueResponse};
use renex_core::{Batch, WorkClass};
use renex_runner::{Runner, RunnerError};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;

/// What one class did during a tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassTick {
    /// In-flight batches observed finished
    pub released: usize,
    /// Batches launched
    pub started: usize,
    /// Batches whose launch failed and were dropped
    pub failed: usize,
}

impl ClassTick {
    fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of a tick
///
/// A class is `None` when its previous pass was still running.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub scheduled: Option<ClassTick>,
    pub event: Option<ClassTick>,
}

impl TickReport {
    pub fn get(&self, class: WorkClass) -> Option<ClassTick> {
        match class {
            WorkClass::Scheduled => self.scheduled,
            WorkClass::Event => self.event,
        }
    }
}

/// State and pass guard of one work class
struct ClassSlot {
    state: Mutex<ClassState>,
    pass: tokio::sync::Mutex<()>,
}

impl ClassSlot {
    fn new(max_concurrency: usize) -> Self {
        Self {
            state: Mutex::new(ClassState::new(max_concurrency)),
            pass: tokio::sync::Mutex::new(()),
        }
    }
}

enum LaunchOutcome {
    Started,
    Failed,
}

pub struct Scheduler {
    runner: Arc<dyn Runner>,
    scheduled: ClassSlot,
    event: ClassSlot,
    config: SchedulerConfig,
    cleanup_guard: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn Runner>, config: SchedulerConfig) -> Self {
        Self {
            runner,
            scheduled: ClassSlot::new(config.max_scheduled_jobs),
            event: ClassSlot::new(config.max_event_jobs),
            config,
            cleanup_guard: tokio::sync::Mutex::new(()),
        }
    }

    fn slot(&self, class: WorkClass) -> &ClassSlot {
        match class {
            WorkClass::Scheduled => &self.scheduled,
            WorkClass::Event => &self.event,
        }
    }

    fn state(&self, class: WorkClass) -> MutexGuard<'_, ClassState> {
        // state stays consistent between statements, so a poisoned lock is still usable
        self.slot(class)
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Offers a batch to the queue of its class
    pub fn enqueue(&self, batch: Batch) -> Admission {
        let class = batch.class;
        let id = batch.id.clone();
        let size = batch.repositories.len();

        let admission = self.state(class).admit(batch);

        match admission {
            Admission::Queued => info!(
                "Queued {} batch {} with {} repositories",
                class, id, size
            ),
            Admission::Duplicate => {
                warn!("{} batch {} is already queued or running", class, id)
            }
        }

        admission
    }

    /// In-flight batches of both classes
    pub fn jobs(&self) -> JobsResponse {
        JobsResponse {
            scheduled: self.state(WorkClass::Scheduled).in_flight(),
            event: self.state(WorkClass::Event).in_flight(),
        }
    }

    /// Pending batches of both classes
    pub fn queue(&self) -> QueueResponse {
        QueueResponse {
            scheduled: self.state(WorkClass::Scheduled).queued(),
            event: self.state(WorkClass::Event).queued(),
        }
    }

    /// Runs one reconcile-then-admit pass over both classes, then cleans up
    ///
    /// A class whose previous pass is still in progress is skipped, and so
    /// is the cleanup if the previous one has not returned yet.
    pub async fn tick(&self) -> TickReport {
        let (scheduled, event) = tokio::join!(
            self.tick_class(WorkClass::Scheduled),
            self.tick_class(WorkClass::Event)
        );

        self.clean_up().await;

        TickReport { scheduled, event }
    }

    async fn tick_class(&self, class: WorkClass) -> Option<ClassTick> {
        let Ok(_pass) = self.slot(class).pass.try_lock() else {
            debug!("Previous {} pass still running, skipping", class);
            return None;
        };

        let mut report = ClassTick::default();

        let running = self.state(class).running_batches();
        let probes = running
            .into_iter()
            .map(|batch| async move { self.reconcile(class, batch).await });
        report.released = join_all(probes).await.into_iter().filter(|r| *r).count();

        let reserved = self.state(class).reserve();
        let launches = reserved
            .into_iter()
            .map(|batch| async move { self.admit(class, batch).await });
        for outcome in join_all(launches).await {
            match outcome {
                LaunchOutcome::Started => report.started += 1,
                LaunchOutcome::Failed => report.failed += 1,
            }
        }

        if !report.is_idle() {
            let state = self.state(class);
            debug!(
                "{} class: {} in flight, {} queued, max {}",
                class,
                state.in_flight_len(),
                state.queue_len(),
                state.max_concurrency()
            );
        }

        Some(report)
    }

    /// Probes one in-flight batch and frees its slot once it finished
    async fn reconcile(&self, class: WorkClass, batch: Batch) -> bool {
        if self.is_running(&batch).await {
            return false;
        }

        let released = self.state(class).release(&batch.id);
        if released {
            info!("{} job {} finished, slot released", class, batch.job_name());
        }
        released
    }

    /// Launches one reserved batch and records the outcome
    async fn admit(&self, class: WorkClass, batch: Batch) -> LaunchOutcome {
        match self.launch(&batch).await {
            Ok(()) => {
                info!("Started {} job {}", class, batch.job_name());
                self.state(class).launched(batch);
                LaunchOutcome::Started
            }
            Err(e) => {
                error!("Dropping {} batch {}: {}", class, batch.id, e);
                self.state(class).abandon(&batch.id);
                LaunchOutcome::Failed
            }
        }
    }

    async fn launch(&self, batch: &Batch) -> Result<(), RunnerError> {
        match time::timeout(self.config.call_timeout, self.runner.run_job(batch)).await {
            Ok(result) => result,
            Err(_) => Err(RunnerError::launch(
                batch,
                format!(
                    "timed out after {}",
                    humantime::format_duration(self.config.call_timeout)
                ),
            )),
        }
    }

    /// Probes a batch, retrying transient failures with exponential backoff
    ///
    /// A batch whose probes keep failing is reported as not running so its
    /// slot cannot leak.
    async fn is_running(&self, batch: &Batch) -> bool {
        let attempts = self.config.probe_attempts.max(1);
        let mut backoff = self.config.probe_backoff;

        for attempt in 1..=attempts {
            let outcome = time::timeout(self.config.call_timeout, self.runner.check_job(batch))
                .await
                .unwrap_or_else(|_| {
                    Err(RunnerError::probe(
                        batch,
                        format!(
                            "timed out after {}",
                            humantime::format_duration(self.config.call_timeout)
                        ),
                    ))
                });

            match outcome {
                Ok(running) => return running,
                Err(e) => warn!("Probe attempt {}/{} failed: {}", attempt, attempts, e),
            }

            if attempt < attempts {
                time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        warn!(
            "Giving up on probing {} after {} attempts, treating it as finished",
            batch.job_name(),
            attempts
        );
        false
    }

    async fn clean_up(&self) {
        let Ok(_guard) = self.cleanup_guard.try_lock() else {
            debug!("Previous cleanup still running, skipping");
            return;
        };

        match time::timeout(self.config.call_timeout, self.runner.clean_up()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} runner: {}", self.runner.name(), e),
            Err(_) => warn!("{} runner cleanup timed out", self.runner.name()),
        }
    }

    /// Control loop, starts a tick every interval until the task is dropped
    pub async fn run(self: Arc<Self>) {
        info!(
            "Scheduler started (tick every {}, max {} scheduled / {} event jobs)",
            humantime::format_duration(self.config.tick_interval),
            self.config.max_scheduled_jobs,
            self.config.max_event_jobs
        );

        let mut interval = time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.tick().await;
            });
        }
    }
}
