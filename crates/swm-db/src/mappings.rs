//! Database operations for `cheapshark_mappings`.
//!
//! Every `record_*` call is a single upsert that bumps `attempts` and stamps
//! `last_attempt`, so a write can never lose an attempt or leave the row
//! half-updated.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use swm_core::{AppId, MappingDetails, MappingStatus};

use crate::DbError;

const MAPPING_COLUMNS: &str = "app_id, status, cheapshark_game_id, thumb_url, \
     cheapest_price_ever, cheapest_price_date, cheapest_store, deals_count, \
     no_mapping_found, attempts, last_attempt, last_error, mapping_updated, created_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct MappingRow {
    app_id: String,
    status: String,
    cheapshark_game_id: Option<String>,
    thumb_url: Option<String>,
    cheapest_price_ever: Option<f64>,
    cheapest_price_date: Option<NaiveDate>,
    cheapest_store: Option<String>,
    deals_count: i64,
    no_mapping_found: bool,
    attempts: i64,
    last_attempt: DateTime<Utc>,
    last_error: Option<String>,
    mapping_updated: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// A stored mapping with its status decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRecord {
    pub app_id: AppId,
    pub status: MappingStatus,
    pub cheapshark_game_id: Option<String>,
    pub thumb_url: Option<String>,
    pub cheapest_price_ever: Option<f64>,
    pub cheapest_price_date: Option<NaiveDate>,
    pub cheapest_store: Option<String>,
    pub deals_count: i64,
    pub no_mapping_found: bool,
    pub attempts: i64,
    pub last_attempt: DateTime<Utc>,
    pub last_error: Option<String>,
    /// When the game id was last (re)confirmed.
    pub mapping_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MappingRow> for MappingRecord {
    type Error = DbError;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            app_id: AppId::parse(&row.app_id)?,
            status: row.status.parse()?,
            cheapshark_game_id: row.cheapshark_game_id,
            thumb_url: row.thumb_url,
            cheapest_price_ever: row.cheapest_price_ever,
            cheapest_price_date: row.cheapest_price_date,
            cheapest_store: row.cheapest_store,
            deals_count: row.deals_count,
            no_mapping_found: row.no_mapping_found,
            attempts: row.attempts,
            last_attempt: row.last_attempt,
            last_error: row.last_error,
            mapping_updated: row.mapping_updated,
            created_at: row.created_at,
        })
    }
}

/// Compact answer to "has this app been looked up, and how did it go?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingStatusView {
    pub attempted: bool,
    pub status: MappingStatus,
    pub attempts: i64,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl MappingStatusView {
    fn never_attempted() -> Self {
        Self {
            attempted: false,
            status: MappingStatus::Unknown,
            attempts: 0,
            last_attempt: None,
        }
    }
}

/// Filters for [`query_by_status`]. Every bound is optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusQuery {
    /// Only rows whose `last_attempt` is strictly before this instant.
    pub older_than: Option<DateTime<Utc>>,
    pub min_attempts: Option<i64>,
    /// Inclusive upper bound on `attempts`.
    pub max_attempts: Option<i64>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns the full mapping row for `app_id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the app has never been attempted, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_mapping(pool: &SqlitePool, app_id: &AppId) -> Result<MappingRecord, DbError> {
    let row = sqlx::query_as::<_, MappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM cheapshark_mappings WHERE app_id = ?1"
    ))
    .bind(app_id.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Returns the status view for `app_id`; never-attempted apps come back as
/// `attempted = false, status = Unknown`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if
/// the stored status is unrecognised.
pub async fn get_mapping_status(
    pool: &SqlitePool,
    app_id: &AppId,
) -> Result<MappingStatusView, DbError> {
    let row = sqlx::query_as::<_, (String, i64, DateTime<Utc>)>(
        "SELECT status, attempts, last_attempt FROM cheapshark_mappings WHERE app_id = ?1",
    )
    .bind(app_id.as_str())
    .fetch_optional(pool)
    .await?;

    match row {
        None => Ok(MappingStatusView::never_attempted()),
        Some((status, attempts, last_attempt)) => Ok(MappingStatusView {
            attempted: true,
            status: status.parse()?,
            attempts,
            last_attempt: Some(last_attempt),
        }),
    }
}

/// Returns the subset of `app_ids` that currently have status `found`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_found_app_ids(
    pool: &SqlitePool,
    app_ids: &[AppId],
) -> Result<HashSet<AppId>, DbError> {
    if app_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT app_id FROM cheapshark_mappings WHERE status = 'found' AND app_id IN (",
    );
    let mut ids = qb.separated(", ");
    for app_id in app_ids {
        ids.push_bind(app_id.as_str());
    }
    ids.push_unseparated(")");

    let rows: Vec<String> = qb.build_query_scalar().fetch_all(pool).await?;
    rows.iter()
        .map(|id| AppId::parse(id).map_err(DbError::from))
        .collect()
}

/// Lists mappings in any of `statuses`, oldest `last_attempt` first.
///
/// Returns an empty list when `statuses` is empty.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if a
/// stored row is malformed.
pub async fn query_by_status(
    pool: &SqlitePool,
    statuses: &[MappingStatus],
    filter: StatusQuery,
) -> Result<Vec<MappingRecord>, DbError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {MAPPING_COLUMNS} FROM cheapshark_mappings WHERE status IN ("
    ));
    let mut wanted = qb.separated(", ");
    for status in statuses {
        wanted.push_bind(status.as_str());
    }
    wanted.push_unseparated(")");

    if let Some(older_than) = filter.older_than {
        qb.push(" AND last_attempt < ").push_bind(older_than);
    }
    if let Some(min) = filter.min_attempts {
        qb.push(" AND attempts >= ").push_bind(min);
    }
    if let Some(max) = filter.max_attempts {
        qb.push(" AND attempts <= ").push_bind(max);
    }
    qb.push(" ORDER BY last_attempt ASC, app_id ASC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    let rows = qb.build_query_as::<MappingRow>().fetch_all(pool).await?;
    rows.into_iter().map(MappingRecord::try_from).collect()
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Records a successful mapping, clearing any earlier negative classification
/// or error. Returns the new attempt count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_found(
    pool: &SqlitePool,
    app_id: &AppId,
    details: &MappingDetails,
) -> Result<i64, DbError> {
    let now = Utc::now();
    let attempts = sqlx::query_scalar::<_, i64>(
        "INSERT INTO cheapshark_mappings \
             (app_id, status, cheapshark_game_id, thumb_url, cheapest_price_ever, \
              cheapest_price_date, cheapest_store, deals_count, no_mapping_found, \
              attempts, last_attempt, last_error, mapping_updated, created_at) \
         VALUES (?1, 'found', ?2, ?3, ?4, ?5, ?6, ?7, 0, 1, ?8, NULL, ?8, ?8) \
         ON CONFLICT (app_id) DO UPDATE SET \
             status = 'found', \
             cheapshark_game_id = excluded.cheapshark_game_id, \
             thumb_url = excluded.thumb_url, \
             cheapest_price_ever = excluded.cheapest_price_ever, \
             cheapest_price_date = excluded.cheapest_price_date, \
             cheapest_store = excluded.cheapest_store, \
             deals_count = excluded.deals_count, \
             no_mapping_found = 0, \
             attempts = cheapshark_mappings.attempts + 1, \
             last_attempt = excluded.last_attempt, \
             last_error = NULL, \
             mapping_updated = excluded.mapping_updated \
         RETURNING attempts",
    )
    .bind(app_id.as_str())
    .bind(&details.cheapshark_game_id)
    .bind(details.thumb_url.as_deref())
    .bind(details.cheapest_price_ever)
    .bind(details.cheapest_price_date)
    .bind(details.cheapest_store.as_deref())
    .bind(details.deals_count)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(attempts)
}

/// Records a durable negative classification: `too_new` when the app is a
/// recent release, `not_found` otherwise. Any earlier game id, enrichment
/// data and error are cleared. Returns the new attempt count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_no_mapping(
    pool: &SqlitePool,
    app_id: &AppId,
    is_recent_release: bool,
) -> Result<i64, DbError> {
    let status = if is_recent_release {
        MappingStatus::TooNew
    } else {
        MappingStatus::NotFound
    };
    let now = Utc::now();

    let attempts = sqlx::query_scalar::<_, i64>(
        "INSERT INTO cheapshark_mappings \
             (app_id, status, deals_count, no_mapping_found, attempts, last_attempt, created_at) \
         VALUES (?1, ?2, 0, 1, 1, ?3, ?3) \
         ON CONFLICT (app_id) DO UPDATE SET \
             status = excluded.status, \
             cheapshark_game_id = NULL, \
             thumb_url = NULL, \
             cheapest_price_ever = NULL, \
             cheapest_price_date = NULL, \
             cheapest_store = NULL, \
             deals_count = 0, \
             no_mapping_found = 1, \
             attempts = cheapshark_mappings.attempts + 1, \
             last_attempt = excluded.last_attempt, \
             last_error = NULL \
         RETURNING attempts",
    )
    .bind(app_id.as_str())
    .bind(status.as_str())
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(attempts)
}

/// Records a transient lookup failure. The previous game id and enrichment
/// data are dropped so a `failed` row never advertises a stale mapping.
/// Returns the new attempt count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_failure(
    pool: &SqlitePool,
    app_id: &AppId,
    error_message: &str,
) -> Result<i64, DbError> {
    let now = Utc::now();
    let attempts = sqlx::query_scalar::<_, i64>(
        "INSERT INTO cheapshark_mappings \
             (app_id, status, deals_count, no_mapping_found, attempts, last_attempt, \
              last_error, created_at) \
         VALUES (?1, 'failed', 0, 0, 1, ?2, ?3, ?2) \
         ON CONFLICT (app_id) DO UPDATE SET \
             status = 'failed', \
             cheapshark_game_id = NULL, \
             thumb_url = NULL, \
             cheapest_price_ever = NULL, \
             cheapest_price_date = NULL, \
             cheapest_store = NULL, \
             deals_count = 0, \
             no_mapping_found = 0, \
             attempts = cheapshark_mappings.attempts + 1, \
             last_attempt = excluded.last_attempt, \
             last_error = excluded.last_error \
         RETURNING attempts",
    )
    .bind(app_id.as_str())
    .bind(now)
    .bind(error_message)
    .fetch_one(pool)
    .await?;

    Ok(attempts)
}

/// Deletes the mapping rows for `app_ids` so they read as never attempted.
/// Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails; nothing is removed in that
/// case.
pub async fn reset_mappings(
    pool: &SqlitePool,
    app_ids: &[AppId],
    reason: &str,
) -> Result<u64, DbError> {
    if app_ids.is_empty() {
        return Ok(0);
    }

    let mut conn = pool.acquire().await?;
    let removed = delete_mappings(&mut *conn, app_ids).await?;
    tracing::info!(requested = app_ids.len(), removed, reason, "reset mappings");
    Ok(removed)
}

pub(crate) async fn delete_mappings(
    conn: &mut SqliteConnection,
    app_ids: &[AppId],
) -> Result<u64, DbError> {
    if app_ids.is_empty() {
        return Ok(0);
    }

    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM cheapshark_mappings WHERE app_id IN (");
    let mut ids = qb.separated(", ");
    for app_id in app_ids {
        ids.push_bind(app_id.as_str());
    }
    ids.push_unseparated(")");

    Ok(qb.build().execute(&mut *conn).await?.rows_affected())
}
