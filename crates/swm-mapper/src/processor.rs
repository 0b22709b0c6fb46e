//! Batch driver: claims queue jobs, classifies each app, and records the
//! outcome in the mapping store.
//!
//! Jobs in a batch run sequentially. A failure on one job is recorded against
//! that job and never aborts the rest of the batch.

use chrono::Utc;
use sqlx::SqlitePool;
use swm_core::{
    is_recent_release, AppCatalog, AppConfig, BatchResult, LookupOutcome, MappingLookup,
    MappingStatus,
};
use swm_db::QueueJob;
use tokio_util::sync::CancellationToken;

use crate::MapperError;

#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Jobs at or above this retry count are never claimed.
    pub max_retries: u32,
    /// Releases no older than this many days are classified `too_new`.
    pub recent_release_days: u32,
}

impl ProcessorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.queue_max_retries,
            recent_release_days: config.recent_release_days,
        }
    }
}

/// How a single job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Skipped,
    Found,
    NoMapping { too_new: bool },
    Failed { http_error: bool },
}

pub struct BatchProcessor<L, C> {
    pool: SqlitePool,
    lookup: L,
    catalog: C,
    config: ProcessorConfig,
}

impl<L, C> BatchProcessor<L, C>
where
    L: MappingLookup,
    C: AppCatalog,
{
    pub fn new(pool: SqlitePool, lookup: L, catalog: C, config: ProcessorConfig) -> Self {
        Self {
            pool,
            lookup,
            catalog,
            config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> ProcessorConfig {
        self.config
    }

    /// Claims up to `batch_size` jobs and processes them one by one.
    ///
    /// When `cancel` fires, the job in flight finishes and every job not yet
    /// started is released back to `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Db`] only if the jobs cannot be claimed.
    /// Per-job failures are recorded and counted instead.
    pub async fn process_batch(
        &self,
        batch_size: u32,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, MapperError> {
        let jobs = swm_db::dequeue(&self.pool, batch_size, self.config.max_retries).await?;
        let mut result = BatchResult::new(Utc::now());
        if jobs.is_empty() {
            tracing::debug!("processor: queue is empty");
            return Ok(result);
        }

        tracing::info!(claimed = jobs.len(), "processor: starting batch");

        let mut jobs = jobs.into_iter();
        while let Some(job) = jobs.next() {
            if cancel.is_cancelled() {
                let remaining: Vec<QueueJob> =
                    std::iter::once(job).chain(jobs.by_ref()).collect();
                tracing::info!(
                    released = remaining.len(),
                    "processor: stop requested; releasing unstarted jobs"
                );
                self.release_jobs(&remaining).await;
                break;
            }

            match self.process_job(&job).await {
                JobOutcome::Skipped => result.record_skipped(),
                JobOutcome::Found => result.record_found(),
                JobOutcome::NoMapping { too_new } => result.record_no_mapping(too_new),
                JobOutcome::Failed { http_error } => result.record_failed(http_error),
            }
        }

        result.timestamp = Utc::now();
        tracing::info!(
            processed = result.processed,
            successful = result.successful,
            not_found = result.not_found,
            too_new = result.too_new,
            failed = result.failed,
            api_errors = result.api_errors,
            skipped = result.skipped,
            "processor: batch complete"
        );
        Ok(result)
    }

    /// Runs batches until the queue is empty, `max_items` jobs were
    /// processed, or `cancel` fires. Returns the summed result.
    ///
    /// # Errors
    ///
    /// Returns the first [`MapperError`] raised by [`Self::process_batch`];
    /// batches completed before it stay recorded.
    pub async fn drain(
        &self,
        batch_size: u32,
        max_items: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, MapperError> {
        let mut total = BatchResult::new(Utc::now());

        loop {
            let size = match max_items {
                Some(max) => batch_size.min(max.saturating_sub(total.processed)),
                None => batch_size,
            };
            if size == 0 || cancel.is_cancelled() {
                break;
            }

            let batch = self.process_batch(size, cancel).await?;
            total.absorb(&batch);
            if batch.processed == 0 {
                break;
            }
        }

        Ok(total)
    }

    async fn process_job(&self, job: &QueueJob) -> JobOutcome {
        match self.try_process_job(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    app_id = %job.app_id,
                    job_id = job.id,
                    error = %e,
                    "processor: job failed"
                );
                self.mark_failed(job, &e.to_string()).await;
                JobOutcome::Failed { http_error: false }
            }
        }
    }

    async fn try_process_job(&self, job: &QueueJob) -> Result<JobOutcome, MapperError> {
        let current = swm_db::get_mapping_status(&self.pool, &job.app_id).await?;
        if current.status == MappingStatus::Found {
            swm_db::complete_job(&self.pool, job.id).await?;
            tracing::debug!(app_id = %job.app_id, "processor: already mapped; skipped lookup");
            return Ok(JobOutcome::Skipped);
        }

        match self.lookup.lookup(&job.app_id).await {
            LookupOutcome::Found(details) => {
                swm_db::record_found(&self.pool, &job.app_id, &details).await?;
                swm_db::complete_job(&self.pool, job.id).await?;
                tracing::info!(
                    app_id = %job.app_id,
                    game_id = %details.cheapshark_game_id,
                    "processor: mapping found"
                );
                Ok(JobOutcome::Found)
            }
            LookupOutcome::NotFound => {
                let release = self.catalog.release_date(&job.app_id).await?;
                let too_new =
                    is_recent_release(release, Utc::now(), self.config.recent_release_days);
                swm_db::record_no_mapping(&self.pool, &job.app_id, too_new).await?;
                swm_db::complete_job(&self.pool, job.id).await?;
                tracing::debug!(app_id = %job.app_id, too_new, "processor: no mapping");
                Ok(JobOutcome::NoMapping { too_new })
            }
            LookupOutcome::ApiError(failure) => {
                tracing::warn!(app_id = %job.app_id, error = %failure, "processor: lookup error");
                self.mark_failed(job, &failure.to_string()).await;
                Ok(JobOutcome::Failed {
                    http_error: failure.is_http_error(),
                })
            }
        }
    }

    /// Fails the job, then records the failure on the mapping.
    ///
    /// If the job cannot be failed it is left `processing` for stale
    /// recovery and the mapping is not touched.
    async fn mark_failed(&self, job: &QueueJob, message: &str) {
        if let Err(e) = swm_db::fail_job(&self.pool, job.id, message).await {
            tracing::error!(
                app_id = %job.app_id,
                job_id = job.id,
                error = %e,
                "processor: could not fail job; leaving it for stale recovery"
            );
            return;
        }
        if let Err(e) = swm_db::record_failure(&self.pool, &job.app_id, message).await {
            tracing::error!(
                app_id = %job.app_id,
                error = %e,
                "processor: could not record failure"
            );
        }
    }

    async fn release_jobs(&self, jobs: &[QueueJob]) {
        for job in jobs {
            if let Err(e) = swm_db::release_job(&self.pool, job.id).await {
                tracing::warn!(job_id = job.id, error = %e, "processor: could not release job");
            }
        }
    }
}
