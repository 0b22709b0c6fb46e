//! Database operations for the local `apps` catalog.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use swm_core::{catalog::parse_release_date, AppCatalog, AppId, CatalogError};

use crate::DbError;

/// A row from the `apps` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppRow {
    pub app_id: String,
    pub name: String,
    /// Release date as imported; Steam's store format or ISO-8601.
    pub release_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inserts or updates a catalog entry. `release_date` is stored verbatim.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_app(
    pool: &SqlitePool,
    app_id: &AppId,
    name: &str,
    release_date: Option<&str>,
) -> Result<(), DbError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO apps (app_id, name, release_date, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4) \
         ON CONFLICT (app_id) DO UPDATE SET \
             name = excluded.name, \
             release_date = excluded.release_date, \
             updated_at = excluded.updated_at",
    )
    .bind(app_id.as_str())
    .bind(name)
    .bind(release_date)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns the catalog entry for `app_id`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_app(pool: &SqlitePool, app_id: &AppId) -> Result<Option<AppRow>, DbError> {
    let row = sqlx::query_as::<_, AppRow>(
        "SELECT app_id, name, release_date, created_at, updated_at FROM apps WHERE app_id = ?1",
    )
    .bind(app_id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Catalog apps with no mapping row and no active queue job, most recently
/// imported first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if a
/// stored id is malformed.
pub async fn list_never_attempted_apps(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<AppId>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT a.app_id FROM apps a \
         LEFT JOIN cheapshark_mappings m ON m.app_id = a.app_id \
         WHERE m.app_id IS NULL \
           AND NOT EXISTS ( \
               SELECT 1 FROM mapping_queue q \
               WHERE q.app_id = a.app_id AND q.status IN ('pending', 'processing') \
           ) \
         ORDER BY a.updated_at DESC, a.app_id ASC \
         LIMIT ?1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    ids.iter()
        .map(|id| AppId::parse(id).map_err(DbError::from))
        .collect()
}

/// [`AppCatalog`] backed by the `apps` table.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppCatalog for SqliteCatalog {
    async fn release_date(&self, app_id: &AppId) -> Result<Option<NaiveDate>, CatalogError> {
        let raw = sqlx::query_scalar::<_, Option<String>>(
            "SELECT release_date FROM apps WHERE app_id = ?1",
        )
        .bind(app_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError {
            app_id: app_id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(raw.flatten().as_deref().and_then(parse_release_date))
    }
}
