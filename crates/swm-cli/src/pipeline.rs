//! Command handlers that change pipeline state: catalog, queue, processing,
//! and the long-running scheduler.
//!
//! These are called from `main` after the database pool and config are
//! established and migrations have run.

use sqlx::SqlitePool;
use swm_cheapshark::CheapsharkClient;
use swm_core::{AppConfig, AppId, BatchResult, MappingStatus};
use swm_db::{SqliteCatalog, StatusQuery};
use swm_mapper::{BatchProcessor, ProcessorConfig, Scheduler, SchedulerConfig};
use tokio_util::sync::CancellationToken;

type Processor = BatchProcessor<CheapsharkClient, SqliteCatalog>;

/// Which apps `enqueue` should queue.
#[derive(Debug)]
pub(crate) enum EnqueueTarget {
    Apps(Vec<String>),
    NeverAttempted { limit: i64 },
}

fn build_processor(pool: &SqlitePool, config: &AppConfig) -> anyhow::Result<Processor> {
    let client = CheapsharkClient::from_app_config(config)
        .map_err(|e| anyhow::anyhow!("failed to build CheapShark client: {e}"))?;
    Ok(BatchProcessor::new(
        pool.clone(),
        client,
        SqliteCatalog::new(pool.clone()),
        ProcessorConfig::from_app_config(config),
    ))
}

/// Add or update one catalog entry.
///
/// The release date is stored as given; a date the catalog cannot parse is
/// treated as unknown when classifying, so it is reported but not rejected.
///
/// # Errors
///
/// Returns an error if the app id is malformed or the write fails.
pub(crate) async fn run_catalog_add(
    pool: &SqlitePool,
    app_id: &str,
    name: &str,
    release_date: Option<&str>,
) -> anyhow::Result<()> {
    let app_id = AppId::parse(app_id)?;
    swm_db::upsert_app(pool, &app_id, name, release_date).await?;

    match release_date {
        Some(raw) if swm_core::parse_release_date(raw).is_none() => {
            println!("saved app {app_id} ({name})");
            println!("warning: release date '{raw}' is not recognised; treated as unknown");
        }
        _ => println!("saved app {app_id} ({name})"),
    }
    Ok(())
}

/// Queue apps for mapping, skipping any that are already mapped.
///
/// # Errors
///
/// Returns an error if no ids are given, any id is malformed, or the
/// enqueue fails.
pub(crate) async fn run_enqueue(
    pool: &SqlitePool,
    config: &AppConfig,
    target: EnqueueTarget,
    priority: i64,
) -> anyhow::Result<()> {
    let queued = match target {
        EnqueueTarget::Apps(raw) => {
            if raw.is_empty() {
                anyhow::bail!("no app ids given; pass ids or --never-attempted");
            }
            let app_ids = AppId::parse_all(&raw)?;
            let queued =
                swm_mapper::enqueue_unmapped(pool, &app_ids, priority, config.queue_max_retries)
                    .await?;
            let skipped = app_ids.len() - queued.len();
            if skipped > 0 {
                println!("{skipped} app(s) skipped: already mapped, already queued, or out of retries");
            }
            queued
        }
        EnqueueTarget::NeverAttempted { limit } => {
            swm_mapper::enqueue_never_attempted(pool, limit, priority, config.queue_max_retries)
                .await?
        }
    };

    println!("queued {} app(s) at priority {priority}", queued.len());
    Ok(())
}

/// Process one batch, or drain the queue with `drain`. Ctrl-C stops after
/// the job in flight and releases the rest.
///
/// # Errors
///
/// Returns an error if the client cannot be built or jobs cannot be claimed.
pub(crate) async fn run_process(
    pool: &SqlitePool,
    config: &AppConfig,
    batch_size: u32,
    drain: bool,
    max_items: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let processor = build_processor(pool, config)?;
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; finishing current job");
            interrupt.cancel();
        }
    });

    let result = if drain {
        processor.drain(batch_size, max_items, &cancel).await
    } else {
        processor.process_batch(batch_size, &cancel).await
    };
    watcher.abort();
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_batch(&result);
    }
    Ok(())
}

fn print_batch(result: &BatchResult) {
    if result.processed == 0 {
        println!("queue is empty; nothing processed");
        return;
    }
    println!(
        "processed {}: {} found ({} already mapped), {} not found, {} too new, {} failed ({} API errors)",
        result.processed,
        result.successful,
        result.skipped,
        result.not_found,
        result.too_new,
        result.failed,
        result.api_errors,
    );
}

/// Run the scheduler until Ctrl-C or SIGTERM, then stop it gracefully.
///
/// # Errors
///
/// Returns an error if the client cannot be built, the scheduler fails to
/// start, or the signal handlers cannot be installed.
pub(crate) async fn run_scheduler(pool: SqlitePool, config: &AppConfig) -> anyhow::Result<()> {
    let processor = build_processor(&pool, config)?;
    let mut scheduler = Scheduler::new(processor, SchedulerConfig::from_app_config(config));
    scheduler.start()?;

    let waited = shutdown_signal().await;
    scheduler.stop().await;
    waited?;

    let status = scheduler.status();
    println!("scheduler stopped");
    print_batch(&status.totals);
    for (tick, stats) in &status.ticks {
        println!("  {:<16}runs {:<6}failures {}", tick.as_str(), stats.runs, stats.failures);
    }
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("received shutdown signal, stopping scheduler");
    Ok(())
}

/// Delete stored mappings, optionally queueing the apps again.
///
/// With `requeue_priority`, only the apps that could be queued are reset;
/// the rest keep their mapping.
///
/// # Errors
///
/// Returns an error if any id is malformed or a statement fails.
pub(crate) async fn run_reset(
    pool: &SqlitePool,
    config: &AppConfig,
    raw_ids: &[String],
    requeue_priority: Option<i64>,
    reason: &str,
) -> anyhow::Result<()> {
    let app_ids = AppId::parse_all(raw_ids)?;

    match requeue_priority {
        Some(priority) => {
            let queued =
                swm_mapper::requeue(pool, &app_ids, priority, config.queue_max_retries, reason)
                    .await?;
            println!(
                "reset and queued {} of {} app(s) at priority {priority}",
                queued.len(),
                app_ids.len()
            );
        }
        None => {
            let removed = swm_db::reset_mappings(pool, &app_ids, reason).await?;
            println!("reset {removed} mapping(s)");
        }
    }
    Ok(())
}

/// Re-queue mappings matching `statuses` and `filter`.
///
/// # Errors
///
/// Returns an error if a query or enqueue fails.
pub(crate) async fn run_retry(
    pool: &SqlitePool,
    config: &AppConfig,
    statuses: &[MappingStatus],
    filter: StatusQuery,
    priority: i64,
) -> anyhow::Result<()> {
    let outcome = swm_mapper::retry_by_criteria(
        pool,
        statuses,
        filter,
        priority,
        config.queue_max_retries,
        "manual retry",
    )
    .await?;

    println!(
        "{} mapping(s) matched; {} queued at priority {priority}",
        outcome.candidates, outcome.requeued
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if either cleanup statement fails.
pub(crate) async fn run_cleanup(
    pool: &SqlitePool,
    retention_days: u32,
    stale_minutes: u32,
) -> anyhow::Result<()> {
    let outcome = swm_mapper::cleanup(pool, retention_days, stale_minutes).await?;
    println!(
        "removed {} finished job(s); recovered {} stale job(s)",
        outcome.removed, outcome.recovered
    );
    Ok(())
}
