//! Database operations for `mapping_queue`.
//!
//! A partial unique index keeps at most one `pending` or `processing` job per
//! app. Retries are new rows: a job enqueued after a `failed` one inherits its
//! `retry_count`, so the retry cap spans the whole history of an app. Cleanup
//! never deletes an app's newest `failed` job, which holds that count.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use swm_core::{AppId, JobStatus};

use crate::DbError;

const JOB_COLUMNS: &str = "id, app_id, priority, added_at, processing_started, completed_at, \
     status, error_message, retry_count";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct QueueJobRow {
    id: i64,
    app_id: String,
    priority: i64,
    added_at: DateTime<Utc>,
    processing_started: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    status: String,
    error_message: Option<String>,
    retry_count: i64,
}

/// A queue job with its status decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueJob {
    pub id: i64,
    pub app_id: AppId,
    pub priority: i64,
    pub added_at: DateTime<Utc>,
    pub processing_started: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub retry_count: i64,
}

impl TryFrom<QueueJobRow> for QueueJob {
    type Error = DbError;

    fn try_from(row: QueueJobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            app_id: AppId::parse(&row.app_id)?,
            priority: row.priority,
            added_at: row.added_at,
            processing_started: row.processing_started,
            completed_at: row.completed_at,
            status: row.status.parse()?,
            error_message: row.error_message,
            retry_count: row.retry_count,
        })
    }
}

/// Job counts per status. `exhausted` is the subset of `failed` jobs that
/// reached the retry cap and will not be picked up again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub exhausted: i64,
}

// ---------------------------------------------------------------------------
// Enqueue / dequeue
// ---------------------------------------------------------------------------

/// Adds a `pending` job for each app that has no active job yet.
///
/// Apps whose latest job failed carry its `retry_count` forward; those that
/// already reached `max_retries` are not re-enqueued. Duplicate ids within
/// `app_ids` collapse to one job. Returns the ids that got a new job, in
/// input order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the whole call is rolled
/// back in that case.
pub async fn enqueue(
    pool: &SqlitePool,
    app_ids: &[AppId],
    priority: i64,
    max_retries: u32,
) -> Result<Vec<AppId>, DbError> {
    if app_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let inserted = enqueue_on(&mut *tx, app_ids, priority, max_retries).await?;
    tx.commit().await?;
    Ok(inserted)
}

/// Enqueues `app_ids` and deletes the stored mappings of the apps that got a
/// job, in one transaction. Apps that could not be queued keep their mapping.
///
/// A batch can never claim one of the new jobs while its app still shows the
/// old mapping.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is queued or
/// reset in that case.
pub async fn requeue_with_reset(
    pool: &SqlitePool,
    app_ids: &[AppId],
    priority: i64,
    max_retries: u32,
    reason: &str,
) -> Result<Vec<AppId>, DbError> {
    if app_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let queued = enqueue_on(&mut *tx, app_ids, priority, max_retries).await?;
    let removed = crate::mappings::delete_mappings(&mut *tx, &queued).await?;
    tx.commit().await?;

    tracing::info!(
        requested = app_ids.len(),
        queued = queued.len(),
        removed,
        reason,
        "requeued and reset mappings"
    );
    Ok(queued)
}

async fn enqueue_on(
    conn: &mut SqliteConnection,
    app_ids: &[AppId],
    priority: i64,
    max_retries: u32,
) -> Result<Vec<AppId>, DbError> {
    let max_retries = i64::from(max_retries);
    let now = Utc::now();
    let mut inserted = Vec::new();

    for app_id in app_ids {
        let latest = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, retry_count FROM mapping_queue \
             WHERE app_id = ?1 ORDER BY id DESC LIMIT 1",
        )
        .bind(app_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        let carried = match latest {
            Some((status, retry_count)) if status == JobStatus::Failed.as_str() => retry_count,
            _ => 0,
        };
        if carried >= max_retries {
            tracing::debug!(app_id = %app_id, retry_count = carried, "retry cap reached, not enqueuing");
            continue;
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO mapping_queue (app_id, priority, added_at, status, retry_count) \
             VALUES (?1, ?2, ?3, 'pending', ?4)",
        )
        .bind(app_id.as_str())
        .bind(priority)
        .bind(now)
        .bind(carried)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            inserted.push(app_id.clone());
        }
    }

    Ok(inserted)
}

/// Claims up to `batch_size` pending jobs, highest priority first and oldest
/// first within a priority, and moves them to `processing`.
///
/// Jobs with `retry_count >= max_retries` are never claimed. The claim is a
/// single statement, so concurrent callers cannot receive the same job.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn dequeue(
    pool: &SqlitePool,
    batch_size: u32,
    max_retries: u32,
) -> Result<Vec<QueueJob>, DbError> {
    if batch_size == 0 {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, QueueJobRow>(&format!(
        "UPDATE mapping_queue SET status = 'processing', processing_started = ?1 \
         WHERE id IN ( \
             SELECT id FROM mapping_queue \
             WHERE status = 'pending' AND retry_count < ?2 \
             ORDER BY priority DESC, added_at ASC, id ASC \
             LIMIT ?3 \
         ) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(Utc::now())
    .bind(i64::from(max_retries))
    .bind(i64::from(batch_size))
    .fetch_all(pool)
    .await?;

    // RETURNING order is unspecified in SQLite.
    let mut jobs = rows
        .into_iter()
        .map(QueueJob::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.added_at.cmp(&b.added_at))
            .then(a.id.cmp(&b.id))
    });
    Ok(jobs)
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Marks a `processing` job as `completed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_job(pool: &SqlitePool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE mapping_queue \
         SET status = 'completed', completed_at = ?1, error_message = NULL \
         WHERE id = ?2 AND status = 'processing'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "processing",
        });
    }

    Ok(())
}

/// Marks a `processing` job as `failed`, stores `error_message`, and bumps
/// `retry_count`. Returns the new retry count.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_job(pool: &SqlitePool, id: i64, error_message: &str) -> Result<i64, DbError> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE mapping_queue \
         SET status = 'failed', completed_at = ?1, error_message = ?2, \
             retry_count = retry_count + 1 \
         WHERE id = ?3 AND status = 'processing' \
         RETURNING retry_count",
    )
    .bind(Utc::now())
    .bind(error_message)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidJobTransition {
        id,
        expected_status: "processing",
    })
}

/// Returns a claimed but unprocessed job to `pending` without counting a
/// retry. Used when a batch is interrupted.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn release_job(pool: &SqlitePool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE mapping_queue SET status = 'pending', processing_started = NULL \
         WHERE id = ?1 AND status = 'processing'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "processing",
        });
    }

    Ok(())
}

/// Resets jobs stuck in `processing` since before `started_before` back to
/// `pending`. Returns the number of jobs recovered.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn recover_stale_jobs(
    pool: &SqlitePool,
    started_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE mapping_queue SET status = 'pending', processing_started = NULL \
         WHERE status = 'processing' AND processing_started < ?1",
    )
    .bind(started_before)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Deletes `completed` and `failed` jobs that finished before
/// `finished_before`. Returns the number of rows removed.
///
/// An app's newest job is kept when it is `failed`: its `retry_count` is what
/// the next enqueue carries forward, so dropping it would reset the cap.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn cleanup_finished_jobs(
    pool: &SqlitePool,
    finished_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM mapping_queue \
         WHERE status IN ('completed', 'failed') AND completed_at < ?1 \
           AND NOT (status = 'failed' AND id = ( \
               SELECT MAX(latest.id) FROM mapping_queue AS latest \
               WHERE latest.app_id = mapping_queue.app_id \
           ))",
    )
    .bind(finished_before)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns a single job by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no such job exists, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<QueueJob, DbError> {
    sqlx::query_as::<_, QueueJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM mapping_queue WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?
    .try_into()
}

/// Returns every job recorded for `app_id`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs_for_app(pool: &SqlitePool, app_id: &AppId) -> Result<Vec<QueueJob>, DbError> {
    let rows = sqlx::query_as::<_, QueueJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM mapping_queue WHERE app_id = ?1 ORDER BY id ASC"
    ))
    .bind(app_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(QueueJob::try_from).collect()
}

/// Counts jobs per status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] on an
/// unrecognised status.
pub async fn queue_counts(pool: &SqlitePool, max_retries: u32) -> Result<QueueCounts, DbError> {
    let rows = sqlx::query_as::<_, (String, i64, i64)>(
        "SELECT status, COUNT(*), \
                COALESCE(SUM(CASE WHEN retry_count >= ?1 THEN 1 ELSE 0 END), 0) \
         FROM mapping_queue GROUP BY status",
    )
    .bind(i64::from(max_retries))
    .fetch_all(pool)
    .await?;

    let mut counts = QueueCounts::default();
    for (status, count, at_cap) in rows {
        match status.parse::<JobStatus>()? {
            JobStatus::Pending => counts.pending = count,
            JobStatus::Processing => counts.processing = count,
            JobStatus::Completed => counts.completed = count,
            JobStatus::Failed => {
                counts.failed = count;
                counts.exhausted = at_cap;
            }
        }
    }
    Ok(counts)
}
