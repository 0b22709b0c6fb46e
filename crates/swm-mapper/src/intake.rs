//! Adding apps to the mapping queue.

use sqlx::SqlitePool;
use swm_core::AppId;

use crate::MapperError;

/// Queue priorities. Higher values are claimed first.
pub mod priority {
    /// Apps a user actually has on a wishlist.
    pub const WISHLIST: i64 = 8;
    pub const TOO_NEW_RECHECK: i64 = 6;
    pub const DEFAULT: i64 = 5;
    pub const FAILED_RETRY: i64 = 3;
    pub const NOT_FOUND_RETRY: i64 = 1;
}

/// Enqueues the apps in `app_ids` that are not already mapped.
///
/// Returns the ids that got a new job.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if the lookup or insert fails.
pub async fn enqueue_unmapped(
    pool: &SqlitePool,
    app_ids: &[AppId],
    priority: i64,
    max_retries: u32,
) -> Result<Vec<AppId>, MapperError> {
    let found = swm_db::list_found_app_ids(pool, app_ids).await?;
    let wanted: Vec<AppId> = app_ids
        .iter()
        .filter(|id| !found.contains(*id))
        .cloned()
        .collect();

    let queued = swm_db::enqueue(pool, &wanted, priority, max_retries).await?;
    tracing::info!(
        requested = app_ids.len(),
        already_mapped = found.len(),
        queued = queued.len(),
        priority,
        "intake: enqueued apps"
    );
    Ok(queued)
}

/// Enqueues up to `limit` catalog apps that have never been looked up.
///
/// # Errors
///
/// Returns [`MapperError::Db`] if the catalog query or insert fails.
pub async fn enqueue_never_attempted(
    pool: &SqlitePool,
    limit: i64,
    priority: i64,
    max_retries: u32,
) -> Result<Vec<AppId>, MapperError> {
    let candidates = swm_db::list_never_attempted_apps(pool, limit).await?;
    let queued = swm_db::enqueue(pool, &candidates, priority, max_retries).await?;
    tracing::info!(
        candidates = candidates.len(),
        queued = queued.len(),
        "intake: enqueued never-attempted catalog apps"
    );
    Ok(queued)
}
