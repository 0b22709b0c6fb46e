//! Recurring pipeline worker.
//!
//! A single spawned task owns every tick: the main batch, the three
//! re-evaluation scans and queue cleanup. Ticks run one after another and
//! never overlap, so lookups stay strictly sequential. Stopping cancels the
//! task between ticks or between jobs; an in-flight lookup always completes.
//! A worker that outlives the stop timeout is kept, so a second worker can
//! never be started next to it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use swm_core::{AppCatalog, AppConfig, BatchResult, MappingLookup};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{reclassify, BatchProcessor, MapperError};

const STOP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub batch_size: u32,
    pub process_interval: Duration,
    pub too_new_interval: Duration,
    pub failed_retry_interval: Duration,
    pub not_found_interval: Duration,
    pub cleanup_interval: Duration,
    pub max_retries: u32,
    pub max_attempts: u32,
    pub recent_release_days: u32,
    pub too_new_recheck_days: u32,
    pub failed_retry_days: u32,
    pub not_found_retry_days: u32,
    pub queue_retention_days: u32,
    pub stale_job_minutes: u32,
    /// How long [`Scheduler::stop`] waits for the worker before giving up.
    pub stop_timeout: Duration,
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            process_interval: minutes(config.process_interval_minutes),
            too_new_interval: hours(config.too_new_interval_hours),
            failed_retry_interval: hours(config.failed_retry_interval_hours),
            not_found_interval: hours(config.not_found_interval_hours),
            cleanup_interval: hours(config.cleanup_interval_hours),
            max_retries: config.queue_max_retries,
            max_attempts: config.max_attempts,
            recent_release_days: config.recent_release_days,
            too_new_recheck_days: config.too_new_recheck_days,
            failed_retry_days: config.failed_retry_days,
            not_found_retry_days: config.not_found_retry_days,
            queue_retention_days: config.queue_retention_days,
            stale_job_minutes: config.stale_job_minutes,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    fn interval(&self, tick: Tick) -> Duration {
        match tick {
            Tick::Process => self.process_interval,
            Tick::TooNewRecheck => self.too_new_interval,
            Tick::FailedRetry => self.failed_retry_interval,
            Tick::NotFoundRetry => self.not_found_interval,
            Tick::Cleanup => self.cleanup_interval,
        }
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(3600))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    StopRequested,
}

/// The recurring jobs, in the order they run when several are due at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tick {
    Process,
    TooNewRecheck,
    FailedRetry,
    NotFoundRetry,
    Cleanup,
}

impl Tick {
    pub const ALL: [Tick; 5] = [
        Tick::Process,
        Tick::TooNewRecheck,
        Tick::FailedRetry,
        Tick::NotFoundRetry,
        Tick::Cleanup,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tick::Process => "process",
            Tick::TooNewRecheck => "too_new_recheck",
            Tick::FailedRetry => "failed_retry",
            Tick::NotFoundRetry => "not_found_retry",
            Tick::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    pub runs: u64,
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Snapshot returned by [`Scheduler::status`].
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub started_at: Option<DateTime<Utc>>,
    pub last_batch: Option<BatchResult>,
    /// Sum of every batch since the scheduler was created.
    pub totals: BatchResult,
    pub ticks: BTreeMap<Tick, TickStats>,
}

impl SchedulerStatus {
    fn new() -> Self {
        Self {
            state: SchedulerState::Stopped,
            started_at: None,
            last_batch: None,
            totals: BatchResult::default(),
            ticks: Tick::ALL
                .iter()
                .map(|tick| (*tick, TickStats::default()))
                .collect(),
        }
    }
}

/// Next due instant per tick.
#[derive(Debug)]
struct TickSchedule {
    next_due: BTreeMap<Tick, Instant>,
}

impl TickSchedule {
    /// Every tick is due immediately.
    fn starting_at(now: Instant) -> Self {
        Self {
            next_due: Tick::ALL.iter().map(|tick| (*tick, now)).collect(),
        }
    }

    fn next_ready(&self, now: Instant) -> Option<Tick> {
        self.next_due
            .iter()
            .find(|(_, due)| **due <= now)
            .map(|(tick, _)| *tick)
    }

    fn earliest(&self, fallback: Instant) -> Instant {
        self.next_due.values().copied().min().unwrap_or(fallback)
    }

    fn mark_ran(&mut self, tick: Tick, finished: Instant, interval: Duration) {
        self.next_due.insert(tick, finished + interval);
    }
}

/// Owns the background worker and its status.
pub struct Scheduler<L, C> {
    processor: Arc<BatchProcessor<L, C>>,
    config: SchedulerConfig,
    status: Arc<Mutex<SchedulerStatus>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl<L, C> Scheduler<L, C>
where
    L: MappingLookup + 'static,
    C: AppCatalog + 'static,
{
    pub fn new(processor: BatchProcessor<L, C>, config: SchedulerConfig) -> Self {
        Self {
            processor: Arc::new(processor),
            config,
            status: Arc::new(Mutex::new(SchedulerStatus::new())),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Spawns the worker task.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::AlreadyRunning`] if the worker is already up.
    pub fn start(&mut self) -> Result<(), MapperError> {
        if self.handle.is_some() {
            return Err(MapperError::AlreadyRunning);
        }

        self.cancel = CancellationToken::new();
        {
            let mut status = self.status.lock();
            status.state = SchedulerState::Running;
            status.started_at = Some(Utc::now());
        }

        tracing::info!(
            batch_size = self.config.batch_size,
            process_interval_secs = self.config.process_interval.as_secs(),
            "scheduler: starting"
        );

        let worker = Worker {
            processor: Arc::clone(&self.processor),
            config: self.config,
            status: Arc::clone(&self.status),
            cancel: self.cancel.clone(),
        };
        self.handle = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Requests a stop and waits for the worker to finish its current job.
    /// A no-op when the scheduler is not running.
    ///
    /// If the worker is still busy after `stop_timeout`, the scheduler stays
    /// in [`SchedulerState::StopRequested`] and keeps the worker handle;
    /// `start` keeps refusing and a later `stop` waits again.
    pub async fn stop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        self.status.lock().state = SchedulerState::StopRequested;
        tracing::info!("scheduler: stop requested");
        self.cancel.cancel();

        match tokio::time::timeout(self.config.stop_timeout, &mut handle).await {
            Ok(Ok(())) => tracing::info!("scheduler: stopped cleanly"),
            Ok(Err(e)) => tracing::error!(error = %e, "scheduler: worker task panicked"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.stop_timeout.as_secs(),
                    "scheduler: worker did not stop within timeout; still waiting on current job"
                );
                self.handle = Some(handle);
                return;
            }
        }

        self.status.lock().state = SchedulerState::Stopped;
    }

    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        self.status.lock().clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

struct Worker<L, C> {
    processor: Arc<BatchProcessor<L, C>>,
    config: SchedulerConfig,
    status: Arc<Mutex<SchedulerStatus>>,
    cancel: CancellationToken,
}

impl<L, C> Worker<L, C>
where
    L: MappingLookup + 'static,
    C: AppCatalog + 'static,
{
    async fn run(self) {
        self.recover_stale_jobs().await;

        let mut schedule = TickSchedule::starting_at(Instant::now());
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if let Some(tick) = schedule.next_ready(Instant::now()) {
                self.run_tick(tick).await;
                schedule.mark_ran(tick, Instant::now(), self.config.interval(tick));
                continue;
            }

            let wake = schedule.earliest(Instant::now() + self.config.process_interval);
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep_until(wake) => {}
            }
        }

        tracing::info!("scheduler: worker exiting");
    }

    async fn recover_stale_jobs(&self) {
        let cutoff = Utc::now() - chrono::Duration::minutes(i64::from(self.config.stale_job_minutes));
        match swm_db::recover_stale_jobs(self.processor.pool(), cutoff).await {
            Ok(0) => {}
            Ok(recovered) => tracing::info!(recovered, "scheduler: recovered stale jobs"),
            Err(e) => tracing::warn!(error = %e, "scheduler: stale job recovery failed"),
        }
    }

    async fn run_tick(&self, tick: Tick) {
        tracing::debug!(%tick, "scheduler: tick");
        let outcome = self.execute(tick).await;

        let mut status = self.status.lock();
        let stats = status.ticks.entry(tick).or_default();
        stats.runs += 1;
        stats.last_run = Some(Utc::now());
        match outcome {
            Ok(()) => stats.last_error = None,
            Err(e) => {
                stats.failures += 1;
                stats.last_error = Some(e.to_string());
                if e.is_retriable() {
                    tracing::warn!(%tick, error = %e, "scheduler: tick failed; will retry next interval");
                } else {
                    tracing::error!(%tick, error = %e, "scheduler: tick failed");
                }
            }
        }
    }

    async fn execute(&self, tick: Tick) -> Result<(), MapperError> {
        let pool = self.processor.pool();
        let config = &self.config;

        match tick {
            Tick::Process => {
                let result = self
                    .processor
                    .process_batch(config.batch_size, &self.cancel)
                    .await?;
                if result.processed > 0 {
                    let mut status = self.status.lock();
                    status.totals.absorb(&result);
                    status.last_batch = Some(result);
                }
            }
            Tick::TooNewRecheck => {
                reclassify::reclassify_too_new(
                    pool,
                    self.processor.catalog(),
                    config.too_new_recheck_days,
                    config.recent_release_days,
                    config.max_retries,
                )
                .await?;
            }
            Tick::FailedRetry => {
                reclassify::retry_failed(
                    pool,
                    config.failed_retry_days,
                    config.max_attempts,
                    config.max_retries,
                )
                .await?;
            }
            Tick::NotFoundRetry => {
                reclassify::retry_not_found(pool, config.not_found_retry_days, config.max_retries)
                    .await?;
            }
            Tick::Cleanup => {
                reclassify::cleanup(pool, config.queue_retention_days, config.stale_job_minutes)
                    .await?;
            }
        }

        Ok(())
    }
}
