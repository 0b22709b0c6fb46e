//! End-to-end pipeline tests: in-memory store, scripted lookups, and a
//! map-backed catalog.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use swm_core::{
    ApiFailure, AppCatalog, AppId, CatalogError, JobStatus, LookupOutcome, MappingDetails,
    MappingLookup, MappingStatus,
};
use swm_db::connect_memory_pool;
use swm_mapper::{
    cleanup, enqueue_never_attempted, enqueue_unmapped, priority, reclassify_too_new,
    retry_failed, retry_not_found, BatchProcessor, MapperError, ProcessorConfig, Scheduler,
    SchedulerConfig, SchedulerState, SchedulerStatus, Tick,
};
use tokio_util::sync::CancellationToken;

const MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Answers from a fixed script; unknown ids are `NotFound`.
#[derive(Default)]
struct ScriptedLookup {
    outcomes: HashMap<String, LookupOutcome>,
    calls: Mutex<Vec<String>>,
    delay: Option<StdDuration>,
}

impl ScriptedLookup {
    fn with(mut self, app_id: &str, outcome: LookupOutcome) -> Self {
        self.outcomes.insert(app_id.to_string(), outcome);
        self
    }

    /// Every lookup takes at least `delay`.
    fn slow(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MappingLookup for ScriptedLookup {
    async fn lookup(&self, app_id: &AppId) -> LookupOutcome {
        self.calls.lock().push(app_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .get(app_id.as_str())
            .cloned()
            .unwrap_or(LookupOutcome::NotFound)
    }
}

#[derive(Default)]
struct MapCatalog {
    dates: HashMap<String, NaiveDate>,
    broken: HashSet<String>,
}

impl MapCatalog {
    fn released_days_ago(mut self, app_id: &str, days: i64) -> Self {
        let date = (Utc::now() - Duration::days(days)).date_naive();
        self.dates.insert(app_id.to_string(), date);
        self
    }

    fn broken(mut self, app_id: &str) -> Self {
        self.broken.insert(app_id.to_string());
        self
    }
}

#[async_trait]
impl AppCatalog for MapCatalog {
    async fn release_date(&self, app_id: &AppId) -> Result<Option<NaiveDate>, CatalogError> {
        if self.broken.contains(app_id.as_str()) {
            return Err(CatalogError {
                app_id: app_id.to_string(),
                reason: "catalog unavailable".to_string(),
            });
        }
        Ok(self.dates.get(app_id.as_str()).copied())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app(id: &str) -> AppId {
    AppId::parse(id).unwrap_or_else(|e| panic!("bad test app id {id}: {e}"))
}

fn found(game_id: &str) -> LookupOutcome {
    LookupOutcome::Found(MappingDetails::bare(game_id))
}

fn processor_config() -> ProcessorConfig {
    ProcessorConfig {
        max_retries: MAX_RETRIES,
        recent_release_days: 30,
    }
}

async fn setup(
    lookup: ScriptedLookup,
    catalog: MapCatalog,
) -> (
    SqlitePool,
    Arc<ScriptedLookup>,
    BatchProcessor<Arc<ScriptedLookup>, MapCatalog>,
) {
    let pool = connect_memory_pool()
        .await
        .expect("connect_memory_pool failed");
    let lookup = Arc::new(lookup);
    let processor =
        BatchProcessor::new(pool.clone(), Arc::clone(&lookup), catalog, processor_config());
    (pool, lookup, processor)
}

async fn enqueue(pool: &SqlitePool, ids: &[&str]) {
    let ids: Vec<AppId> = ids.iter().map(|id| app(id)).collect();
    swm_db::enqueue(pool, &ids, priority::DEFAULT, MAX_RETRIES)
        .await
        .expect("enqueue failed");
}

async fn status_of(pool: &SqlitePool, id: &str) -> MappingStatus {
    swm_db::get_mapping_status(pool, &app(id))
        .await
        .expect("get_mapping_status failed")
        .status
}

async fn latest_job_status(pool: &SqlitePool, id: &str) -> JobStatus {
    swm_db::list_jobs_for_app(pool, &app(id))
        .await
        .expect("list_jobs_for_app failed")
        .last()
        .map(|job| job.status)
        .unwrap_or_else(|| panic!("app {id} has no job"))
}

async fn age_finished_jobs(pool: &SqlitePool, days: i64) {
    sqlx::query("UPDATE mapping_queue SET completed_at = ?1 WHERE completed_at IS NOT NULL")
        .bind(Utc::now() - Duration::days(days))
        .execute(pool)
        .await
        .expect("backdate completed_at failed");
}

async fn backdate_attempt(pool: &SqlitePool, id: &str, days: i64) {
    sqlx::query("UPDATE cheapshark_mappings SET last_attempt = ?1 WHERE app_id = ?2")
        .bind(Utc::now() - Duration::days(days))
        .bind(id)
        .execute(pool)
        .await
        .expect("backdate last_attempt failed");
}

// ---------------------------------------------------------------------------
// Section 1: Batch processing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_classifies_found_not_found_and_api_error() {
    let lookup = ScriptedLookup::default()
        .with("10", found("612"))
        .with("30", LookupOutcome::ApiError(ApiFailure::http(503, "unavailable")));
    let catalog = MapCatalog::default().released_days_ago("20", 400);
    let (pool, _lookup, processor) = setup(lookup, catalog).await;
    enqueue(&pool, &["10", "20", "30"]).await;

    let result = processor
        .process_batch(10, &CancellationToken::new())
        .await
        .expect("process_batch failed");

    assert_eq!(result.processed, 3);
    assert_eq!(result.successful, 1);
    assert_eq!(result.not_found, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.api_errors, 1);
    assert!(result.is_consistent());

    assert_eq!(status_of(&pool, "10").await, MappingStatus::Found);
    assert_eq!(status_of(&pool, "20").await, MappingStatus::NotFound);
    assert_eq!(status_of(&pool, "30").await, MappingStatus::Failed);

    assert_eq!(latest_job_status(&pool, "10").await, JobStatus::Completed);
    assert_eq!(latest_job_status(&pool, "20").await, JobStatus::Completed);
    assert_eq!(latest_job_status(&pool, "30").await, JobStatus::Failed);

    let failed = swm_db::get_mapping(&pool, &app("30")).await.expect("get_mapping failed");
    assert_eq!(failed.last_error.as_deref(), Some("HTTP 503: unavailable"));
}

#[tokio::test]
async fn already_found_apps_skip_the_lookup() {
    let (pool, lookup, processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    swm_db::record_found(&pool, &app("10"), &MappingDetails::bare("612"))
        .await
        .expect("record_found failed");
    enqueue(&pool, &["10"]).await;

    let result = processor
        .process_batch(10, &CancellationToken::new())
        .await
        .expect("process_batch failed");

    assert_eq!(result.processed, 1);
    assert_eq!(result.successful, 1);
    assert_eq!(result.skipped, 1);
    assert!(lookup.calls().is_empty(), "no lookup for a mapped app");
    assert_eq!(latest_job_status(&pool, "10").await, JobStatus::Completed);

    let mapping = swm_db::get_mapping(&pool, &app("10")).await.expect("get_mapping failed");
    assert_eq!(mapping.attempts, 1, "a skipped job is not an attempt");
}

#[tokio::test]
async fn release_age_decides_too_new_versus_not_found() {
    let catalog = MapCatalog::default()
        .released_days_ago("10", 10)
        .released_days_ago("20", 400);
    let (pool, _lookup, processor) = setup(ScriptedLookup::default(), catalog).await;
    enqueue(&pool, &["10", "20", "30"]).await;

    let result = processor
        .process_batch(10, &CancellationToken::new())
        .await
        .expect("process_batch failed");

    assert_eq!(result.too_new, 1);
    assert_eq!(result.not_found, 2, "unknown release dates are not recent");
    assert_eq!(status_of(&pool, "10").await, MappingStatus::TooNew);
    assert_eq!(status_of(&pool, "20").await, MappingStatus::NotFound);
    assert_eq!(status_of(&pool, "30").await, MappingStatus::NotFound);
}

#[tokio::test]
async fn job_errors_are_recorded_and_the_batch_continues() {
    let lookup = ScriptedLookup::default().with("30", found("7"));
    let catalog = MapCatalog::default()
        .released_days_ago("10", 400)
        .broken("20");
    let (pool, _lookup, processor) = setup(lookup, catalog).await;
    enqueue(&pool, &["10", "20", "30"]).await;

    let result = processor
        .process_batch(10, &CancellationToken::new())
        .await
        .expect("process_batch failed");

    assert_eq!(result.processed, 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.api_errors, 0);
    assert_eq!(status_of(&pool, "10").await, MappingStatus::NotFound);
    assert_eq!(status_of(&pool, "20").await, MappingStatus::Failed);
    assert_eq!(status_of(&pool, "30").await, MappingStatus::Found);

    let job = swm_db::list_jobs_for_app(&pool, &app("20"))
        .await
        .expect("list_jobs_for_app failed")
        .pop()
        .expect("job exists");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("catalog unavailable")));
}

#[tokio::test]
async fn transport_errors_do_not_count_as_api_errors() {
    let lookup = ScriptedLookup::default().with(
        "10",
        LookupOutcome::ApiError(ApiFailure::transport("connection reset")),
    );
    let (pool, _lookup, processor) = setup(lookup, MapCatalog::default()).await;
    enqueue(&pool, &["10"]).await;

    let result = processor
        .process_batch(10, &CancellationToken::new())
        .await
        .expect("process_batch failed");

    assert_eq!(result.failed, 1);
    assert_eq!(result.api_errors, 0);
}

#[tokio::test]
async fn cancelled_batch_releases_unstarted_jobs() {
    let (pool, lookup, processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    enqueue(&pool, &["10", "20"]).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = processor
        .process_batch(10, &cancel)
        .await
        .expect("process_batch failed");

    assert_eq!(result.processed, 0);
    assert!(lookup.calls().is_empty());
    let counts = swm_db::queue_counts(&pool, MAX_RETRIES)
        .await
        .expect("queue_counts failed");
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.processing, 0);
}

#[tokio::test]
async fn drain_empties_the_queue_in_batches() {
    let (pool, lookup, processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    enqueue(&pool, &["1", "2", "3", "4", "5"]).await;

    let result = processor
        .drain(2, None, &CancellationToken::new())
        .await
        .expect("drain failed");

    assert_eq!(result.processed, 5);
    assert_eq!(lookup.calls().len(), 5);
}

#[tokio::test]
async fn drain_stops_at_max_items() {
    let (pool, _lookup, processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    enqueue(&pool, &["1", "2", "3", "4", "5"]).await;

    let result = processor
        .drain(2, Some(3), &CancellationToken::new())
        .await
        .expect("drain failed");

    assert_eq!(result.processed, 3);
    let counts = swm_db::queue_counts(&pool, MAX_RETRIES)
        .await
        .expect("queue_counts failed");
    assert_eq!(counts.pending, 2);
}

// ---------------------------------------------------------------------------
// Section 2: Intake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_unmapped_skips_found_apps() {
    let (pool, _lookup, _processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    swm_db::record_found(&pool, &app("10"), &MappingDetails::bare("1"))
        .await
        .expect("record_found failed");

    let queued = enqueue_unmapped(&pool, &[app("10"), app("20")], priority::WISHLIST, MAX_RETRIES)
        .await
        .expect("enqueue_unmapped failed");

    assert_eq!(queued, vec![app("20")]);
    let job = swm_db::list_jobs_for_app(&pool, &app("20"))
        .await
        .expect("list_jobs_for_app failed")
        .pop()
        .expect("job exists");
    assert_eq!(job.priority, priority::WISHLIST);
}

#[tokio::test]
async fn catalog_apps_without_mappings_can_be_enqueued() {
    let (pool, _lookup, _processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    for id in ["10", "20"] {
        swm_db::upsert_app(&pool, &app(id), "Game", None)
            .await
            .expect("upsert_app failed");
    }
    swm_db::record_no_mapping(&pool, &app("10"), false)
        .await
        .expect("record_no_mapping failed");

    let queued = enqueue_never_attempted(&pool, 100, priority::DEFAULT, MAX_RETRIES)
        .await
        .expect("enqueue_never_attempted failed");

    assert_eq!(queued, vec![app("20")]);
}

// ---------------------------------------------------------------------------
// Section 3: Re-evaluation scans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn too_new_apps_are_requeued_once_their_release_ages() {
    let catalog = MapCatalog::default()
        .released_days_ago("10", 70)
        .released_days_ago("20", 20);
    let (pool, _lookup, processor) = setup(ScriptedLookup::default(), catalog).await;
    for id in ["10", "20", "30", "40"] {
        swm_db::record_no_mapping(&pool, &app(id), true)
            .await
            .expect("record_no_mapping failed");
    }
    // 30 and 40 have no release date; only 30 was tried long enough ago.
    backdate_attempt(&pool, "30", 40).await;

    let outcome = reclassify_too_new(&pool, processor.catalog(), 60, 30, MAX_RETRIES)
        .await
        .expect("reclassify_too_new failed");

    assert_eq!(outcome.candidates, 2);
    assert_eq!(outcome.requeued, 2);
    assert_eq!(status_of(&pool, "10").await, MappingStatus::Unknown);
    assert_eq!(status_of(&pool, "20").await, MappingStatus::TooNew);
    assert_eq!(status_of(&pool, "30").await, MappingStatus::Unknown);
    assert_eq!(status_of(&pool, "40").await, MappingStatus::TooNew);

    let job = swm_db::list_jobs_for_app(&pool, &app("10"))
        .await
        .expect("list_jobs_for_app failed")
        .pop()
        .expect("job exists");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.priority, priority::TOO_NEW_RECHECK);
}

#[tokio::test]
async fn requeued_too_new_app_can_map_on_the_next_batch() {
    let lookup = ScriptedLookup::default().with("10", found("900"));
    let catalog = MapCatalog::default().released_days_ago("10", 70);
    let (pool, _lookup, processor) = setup(lookup, catalog).await;
    swm_db::record_no_mapping(&pool, &app("10"), true)
        .await
        .expect("record_no_mapping failed");

    reclassify_too_new(&pool, processor.catalog(), 60, 30, MAX_RETRIES)
        .await
        .expect("reclassify_too_new failed");
    let result = processor
        .process_batch(10, &CancellationToken::new())
        .await
        .expect("process_batch failed");

    assert_eq!(result.successful, 1);
    assert_eq!(status_of(&pool, "10").await, MappingStatus::Found);
}

#[tokio::test]
async fn old_failures_under_the_attempt_cap_are_retried() {
    let (pool, _lookup, _processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    for id in ["10", "20", "30"] {
        swm_db::record_failure(&pool, &app(id), "HTTP 500: boom")
            .await
            .expect("record_failure failed");
    }
    for _ in 0..4 {
        swm_db::record_failure(&pool, &app("30"), "HTTP 500: boom")
            .await
            .expect("record_failure failed");
    }
    backdate_attempt(&pool, "10", 8).await;
    backdate_attempt(&pool, "30", 8).await;

    let outcome = retry_failed(&pool, 7, 5, MAX_RETRIES)
        .await
        .expect("retry_failed failed");

    assert_eq!(outcome.requeued, 1);
    assert_eq!(status_of(&pool, "10").await, MappingStatus::Unknown);
    assert_eq!(status_of(&pool, "20").await, MappingStatus::Failed);
    assert_eq!(status_of(&pool, "30").await, MappingStatus::Failed);
    assert_eq!(latest_job_status(&pool, "10").await, JobStatus::Pending);
}

#[tokio::test]
async fn old_not_found_results_are_rechecked_at_lowest_priority() {
    let (pool, _lookup, _processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    for id in ["10", "20"] {
        swm_db::record_no_mapping(&pool, &app(id), false)
            .await
            .expect("record_no_mapping failed");
    }
    backdate_attempt(&pool, "10", 31).await;

    let outcome = retry_not_found(&pool, 30, MAX_RETRIES)
        .await
        .expect("retry_not_found failed");

    assert_eq!(outcome.requeued, 1);
    let job = swm_db::list_jobs_for_app(&pool, &app("10"))
        .await
        .expect("list_jobs_for_app failed")
        .pop()
        .expect("job exists");
    assert_eq!(job.priority, priority::NOT_FOUND_RETRY);
    assert_eq!(status_of(&pool, "20").await, MappingStatus::NotFound);
}

#[tokio::test]
async fn exhausted_apps_keep_their_failed_mapping() {
    let lookup = ScriptedLookup::default().with(
        "10",
        LookupOutcome::ApiError(ApiFailure::http(500, "boom")),
    );
    let (pool, _lookup, processor) = setup(lookup, MapCatalog::default()).await;
    let cancel = CancellationToken::new();

    for _ in 0..MAX_RETRIES {
        enqueue(&pool, &["10"]).await;
        processor
            .process_batch(10, &cancel)
            .await
            .expect("process_batch failed");
    }
    backdate_attempt(&pool, "10", 8).await;

    let outcome = retry_failed(&pool, 7, 5, MAX_RETRIES)
        .await
        .expect("retry_failed failed");

    assert_eq!(outcome.candidates, 1);
    assert_eq!(outcome.requeued, 0);
    assert_eq!(status_of(&pool, "10").await, MappingStatus::Failed);
}

#[tokio::test]
async fn retry_cap_holds_across_resets_and_queue_cleanup() {
    let lookup = ScriptedLookup::default().with(
        "10",
        LookupOutcome::ApiError(ApiFailure::http(503, "unavailable")),
    );
    let (pool, lookup, processor) = setup(lookup, MapCatalog::default()).await;
    let cancel = CancellationToken::new();
    enqueue(&pool, &["10"]).await;

    // Each round: fail, let the job and the attempt age past retention,
    // clean up, then run the failed-retry scan.
    for round in 1..=MAX_RETRIES {
        let result = processor
            .process_batch(10, &cancel)
            .await
            .expect("process_batch failed");
        assert_eq!(result.failed, 1, "round {round}");

        backdate_attempt(&pool, "10", 8).await;
        age_finished_jobs(&pool, 8).await;
        cleanup(&pool, 7, 60).await.expect("cleanup failed");

        let outcome = retry_failed(&pool, 7, 5, MAX_RETRIES)
            .await
            .expect("retry_failed failed");
        assert_eq!(outcome.candidates, 1, "round {round}");
        assert_eq!(outcome.requeued, usize::from(round < MAX_RETRIES), "round {round}");
    }

    age_finished_jobs(&pool, 60).await;
    cleanup(&pool, 7, 60).await.expect("cleanup failed");
    let outcome = retry_failed(&pool, 7, 5, MAX_RETRIES)
        .await
        .expect("retry_failed failed");
    assert_eq!(outcome.requeued, 0);

    let result = processor
        .process_batch(10, &cancel)
        .await
        .expect("process_batch failed");
    assert_eq!(result.processed, 0);
    assert_eq!(lookup.calls().len(), MAX_RETRIES as usize);
    assert_eq!(status_of(&pool, "10").await, MappingStatus::Failed);

    let jobs = swm_db::list_jobs_for_app(&pool, &app("10"))
        .await
        .expect("list_jobs_for_app failed");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].retry_count, i64::from(MAX_RETRIES));
}

#[tokio::test]
async fn cleanup_recovers_stale_processing_jobs() {
    let (pool, _lookup, _processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    enqueue(&pool, &["10"]).await;
    swm_db::dequeue(&pool, 1, MAX_RETRIES)
        .await
        .expect("dequeue failed");
    sqlx::query("UPDATE mapping_queue SET processing_started = ?1")
        .bind(Utc::now() - Duration::hours(2))
        .execute(&pool)
        .await
        .expect("backdate processing_started failed");

    let outcome = cleanup(&pool, 7, 60).await.expect("cleanup failed");

    assert_eq!(outcome.recovered, 1);
    assert_eq!(latest_job_status(&pool, "10").await, JobStatus::Pending);
}

// ---------------------------------------------------------------------------
// Section 4: Scheduler
// ---------------------------------------------------------------------------

fn fast_scheduler_config() -> SchedulerConfig {
    let hour = StdDuration::from_secs(3600);
    SchedulerConfig {
        batch_size: 10,
        process_interval: StdDuration::from_millis(50),
        too_new_interval: hour,
        failed_retry_interval: hour,
        not_found_interval: hour,
        cleanup_interval: hour,
        max_retries: MAX_RETRIES,
        max_attempts: 5,
        recent_release_days: 30,
        too_new_recheck_days: 60,
        failed_retry_days: 7,
        not_found_retry_days: 30,
        queue_retention_days: 7,
        stale_job_minutes: 60,
        stop_timeout: StdDuration::from_secs(10),
    }
}

async fn wait_for(
    scheduler: &Scheduler<Arc<ScriptedLookup>, MapCatalog>,
    what: &str,
    done: impl Fn(&SchedulerStatus) -> bool,
) {
    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(10);
    loop {
        let status = scheduler.status();
        if done(&status) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}: {status:?}"
        );
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn scheduler_processes_the_queue_and_stops_cleanly() {
    let lookup = ScriptedLookup::default().with("10", found("612"));
    let (pool, _lookup, processor) = setup(lookup, MapCatalog::default()).await;
    enqueue(&pool, &["10", "20"]).await;

    let mut scheduler = Scheduler::new(processor, fast_scheduler_config());
    assert_eq!(scheduler.status().state, SchedulerState::Stopped);

    scheduler.start().expect("start failed");
    assert_eq!(scheduler.status().state, SchedulerState::Running);
    assert!(matches!(scheduler.start(), Err(MapperError::AlreadyRunning)));

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(10);
    loop {
        let status = scheduler.status();
        let cleanup_runs = status.ticks.get(&Tick::Cleanup).map_or(0, |t| t.runs);
        if status.totals.processed >= 2 && cleanup_runs >= 1 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "scheduler did not process the queue in time: {status:?}"
        );
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }

    scheduler.stop().await;

    let status = scheduler.status();
    assert_eq!(status.state, SchedulerState::Stopped);
    assert!(!scheduler.is_running());
    assert_eq!(status.totals.successful, 1);
    assert_eq!(status.totals.not_found, 1);
    assert!(status.ticks.values().all(|t| t.last_error.is_none()));
    assert_eq!(status_of(&pool, "10").await, MappingStatus::Found);
}

#[tokio::test]
async fn scheduler_can_restart_after_stop() {
    let (_pool, _lookup, processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    let mut scheduler = Scheduler::new(processor, fast_scheduler_config());

    scheduler.stop().await;
    assert_eq!(scheduler.status().state, SchedulerState::Stopped);

    scheduler.start().expect("first start failed");
    scheduler.stop().await;
    scheduler.start().expect("restart failed");
    assert_eq!(scheduler.status().state, SchedulerState::Running);
    scheduler.stop().await;
    assert_eq!(scheduler.status().state, SchedulerState::Stopped);
}

#[tokio::test]
async fn failing_ticks_are_recorded_and_the_rest_keep_running() {
    let (pool, _lookup, processor) = setup(ScriptedLookup::default(), MapCatalog::default()).await;
    // The scans read the mappings table; the batch and cleanup only touch the queue.
    sqlx::query("DROP TABLE cheapshark_mappings")
        .execute(&pool)
        .await
        .expect("drop table failed");

    let mut config = fast_scheduler_config();
    config.too_new_interval = StdDuration::from_millis(50);
    config.failed_retry_interval = StdDuration::from_millis(50);
    config.not_found_interval = StdDuration::from_millis(50);
    let mut scheduler = Scheduler::new(processor, config);
    scheduler.start().expect("start failed");

    wait_for(&scheduler, "repeated tick failures", |status| {
        let process_runs = status.ticks.get(&Tick::Process).map_or(0, |t| t.runs);
        let retry_failures = status.ticks.get(&Tick::FailedRetry).map_or(0, |t| t.failures);
        process_runs >= 3 && retry_failures >= 2
    })
    .await;
    assert_eq!(scheduler.status().state, SchedulerState::Running);

    scheduler.stop().await;

    let status = scheduler.status();
    assert_eq!(status.state, SchedulerState::Stopped);
    for tick in [Tick::TooNewRecheck, Tick::FailedRetry, Tick::NotFoundRetry] {
        let stats = &status.ticks[&tick];
        assert!(stats.failures >= 1, "{tick} never failed: {stats:?}");
        assert_eq!(stats.failures, stats.runs, "{tick}: {stats:?}");
        assert!(stats.last_error.is_some(), "{tick} has no error: {stats:?}");
    }
    for tick in [Tick::Process, Tick::Cleanup] {
        let stats = &status.ticks[&tick];
        assert!(stats.runs >= 1, "{tick} never ran");
        assert_eq!(stats.failures, 0, "{tick}: {stats:?}");
        assert!(stats.last_error.is_none(), "{tick}: {stats:?}");
    }
}

#[tokio::test]
async fn stop_timeout_keeps_a_busy_worker_until_it_finishes() {
    let lookup = ScriptedLookup::default()
        .with("10", found("612"))
        .slow(StdDuration::from_millis(500));
    let (pool, lookup, processor) = setup(lookup, MapCatalog::default()).await;
    enqueue(&pool, &["10"]).await;

    let mut config = fast_scheduler_config();
    config.stop_timeout = StdDuration::from_millis(50);
    let mut scheduler = Scheduler::new(processor, config);
    scheduler.start().expect("start failed");

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(10);
    while lookup.calls().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "lookup never started");
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }

    scheduler.stop().await;
    assert_eq!(scheduler.status().state, SchedulerState::StopRequested);
    assert!(scheduler.is_running());
    assert!(matches!(scheduler.start(), Err(MapperError::AlreadyRunning)));

    while scheduler.is_running() {
        assert!(tokio::time::Instant::now() < deadline, "worker never finished");
        scheduler.stop().await;
    }

    assert_eq!(scheduler.status().state, SchedulerState::Stopped);
    assert_eq!(lookup.calls().len(), 1);
    assert_eq!(status_of(&pool, "10").await, MappingStatus::Found);
}
