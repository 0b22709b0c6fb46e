//! Periodic scans that give provisional results another chance.
//!
//! Each scan selects mappings by status and age, enqueues them again, and
//! resets the queued mappings in the same transaction so they read as never
//! attempted until the new job runs. Apps that cannot be enqueued (active
//! job, or retry cap reached) keep their current mapping.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use swm_core::{catalog::release_age_days, AppCatalog, AppId, MappingStatus};
use swm_db::StatusQuery;

use crate::intake::priority;
use crate::MapperError;

/// Result of one re-evaluation scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Mappings that matched the scan criteria.
    pub candidates: usize,
    /// Mappings that were reset and got a new queue job.
    pub requeued: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub removed: u64,
    pub recovered: u64,
}

/// Enqueues `app_ids` at `priority` and resets the mappings of the apps that
/// were actually queued, atomically.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if the enqueue or reset fails.
pub async fn requeue(
    pool: &SqlitePool,
    app_ids: &[AppId],
    priority: i64,
    max_retries: u32,
    reason: &str,
) -> Result<Vec<AppId>, MapperError> {
    Ok(swm_db::requeue_with_reset(pool, app_ids, priority, max_retries, reason).await?)
}

/// Re-queues every mapping in `statuses` that matches `filter`.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if any query fails.
pub async fn retry_by_criteria(
    pool: &SqlitePool,
    statuses: &[MappingStatus],
    filter: StatusQuery,
    priority: i64,
    max_retries: u32,
    reason: &str,
) -> Result<ScanOutcome, MapperError> {
    let rows = swm_db::query_by_status(pool, statuses, filter).await?;
    let ids: Vec<AppId> = rows.into_iter().map(|r| r.app_id).collect();
    let queued = requeue(pool, &ids, priority, max_retries, reason).await?;

    Ok(ScanOutcome {
        candidates: ids.len(),
        requeued: queued.len(),
    })
}

/// Re-queues `too_new` mappings whose release is now older than
/// `recheck_days`.
///
/// When the catalog has no release date, a mapping qualifies once its last
/// attempt is older than `recent_release_days`. Catalog errors skip the app
/// for this scan.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if the store cannot be read or written.
pub async fn reclassify_too_new<C: AppCatalog>(
    pool: &SqlitePool,
    catalog: &C,
    recheck_days: u32,
    recent_release_days: u32,
    max_retries: u32,
) -> Result<ScanOutcome, MapperError> {
    let now = Utc::now();
    let undated_cutoff = now - Duration::days(i64::from(recent_release_days));
    let rows =
        swm_db::query_by_status(pool, &[MappingStatus::TooNew], StatusQuery::default()).await?;

    let mut eligible = Vec::new();
    for row in rows {
        let release = match catalog.release_date(&row.app_id).await {
            Ok(release) => release,
            Err(e) => {
                tracing::warn!(app_id = %row.app_id, error = %e, "reclassify: catalog lookup failed");
                continue;
            }
        };
        let due = match release {
            Some(date) => release_age_days(date, now) > i64::from(recheck_days),
            None => row.last_attempt < undated_cutoff,
        };
        if due {
            eligible.push(row.app_id);
        }
    }

    let queued = requeue(
        pool,
        &eligible,
        priority::TOO_NEW_RECHECK,
        max_retries,
        "too_new release aged past recheck window",
    )
    .await?;

    let outcome = ScanOutcome {
        candidates: eligible.len(),
        requeued: queued.len(),
    };
    tracing::info!(
        candidates = outcome.candidates,
        requeued = outcome.requeued,
        "reclassify: too_new recheck done"
    );
    Ok(outcome)
}

/// Re-queues `failed` mappings last tried more than `older_than_days` ago
/// with fewer than `max_attempts` attempts.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if any query fails.
pub async fn retry_failed(
    pool: &SqlitePool,
    older_than_days: u32,
    max_attempts: u32,
    max_retries: u32,
) -> Result<ScanOutcome, MapperError> {
    let filter = StatusQuery {
        older_than: Some(Utc::now() - Duration::days(i64::from(older_than_days))),
        max_attempts: Some(i64::from(max_attempts) - 1),
        ..StatusQuery::default()
    };
    let outcome = retry_by_criteria(
        pool,
        &[MappingStatus::Failed],
        filter,
        priority::FAILED_RETRY,
        max_retries,
        "failed lookup retry",
    )
    .await?;

    tracing::info!(
        candidates = outcome.candidates,
        requeued = outcome.requeued,
        "reclassify: failed retry done"
    );
    Ok(outcome)
}

/// Re-queues `not_found` mappings last tried more than `older_than_days` ago.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if any query fails.
pub async fn retry_not_found(
    pool: &SqlitePool,
    older_than_days: u32,
    max_retries: u32,
) -> Result<ScanOutcome, MapperError> {
    let filter = StatusQuery {
        older_than: Some(Utc::now() - Duration::days(i64::from(older_than_days))),
        ..StatusQuery::default()
    };
    let outcome = retry_by_criteria(
        pool,
        &[MappingStatus::NotFound],
        filter,
        priority::NOT_FOUND_RETRY,
        max_retries,
        "not_found periodic recheck",
    )
    .await?;

    tracing::info!(
        candidates = outcome.candidates,
        requeued = outcome.requeued,
        "reclassify: not_found retry done"
    );
    Ok(outcome)
}

/// Deletes finished jobs older than `retention_days` and returns jobs stuck in
/// `processing` for more than `stale_minutes` to `pending`.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if either statement fails.
pub async fn cleanup(
    pool: &SqlitePool,
    retention_days: u32,
    stale_minutes: u32,
) -> Result<CleanupOutcome, MapperError> {
    let now = Utc::now();
    let removed =
        swm_db::cleanup_finished_jobs(pool, now - Duration::days(i64::from(retention_days)))
            .await?;
    let recovered =
        swm_db::recover_stale_jobs(pool, now - Duration::minutes(i64::from(stale_minutes)))
            .await?;

    tracing::info!(removed, recovered, "reclassify: queue cleanup done");
    Ok(CleanupOutcome { removed, recovered })
}
