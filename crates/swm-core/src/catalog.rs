//! Read-only view of the Steam app catalog.
//!
//! The catalog itself is owned by the import pipeline; the mapping core only
//! asks it for release dates to tell recent releases apart.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::AppId;

#[derive(Debug, Error)]
#[error("catalog lookup failed for app {app_id}: {reason}")]
pub struct CatalogError {
    pub app_id: String,
    pub reason: String,
}

#[async_trait]
pub trait AppCatalog: Send + Sync {
    /// Release date of `app_id`, or `None` when unknown or unparseable.
    async fn release_date(&self, app_id: &AppId) -> Result<Option<NaiveDate>, CatalogError>;
}

#[async_trait]
impl<T: AppCatalog + ?Sized> AppCatalog for std::sync::Arc<T> {
    async fn release_date(&self, app_id: &AppId) -> Result<Option<NaiveDate>, CatalogError> {
        (**self).release_date(app_id).await
    }
}

// Steam's store API reports dates as e.g. "21 Jul, 2016" or "Jul 21, 2016"
// depending on locale; imports may also store ISO dates.
const RELEASE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d %b, %Y",
    "%b %d, %Y",
    "%d %B, %Y",
    "%B %d, %Y",
];

/// Parses a stored release date, returning `None` for empty or unrecognised
/// text such as "Coming soon".
#[must_use]
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    RELEASE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Whole days between `release` and `now`; negative for future releases.
#[must_use]
pub fn release_age_days(release: NaiveDate, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - release).num_days()
}

/// `true` when the release is no older than `window_days`.
///
/// Unknown release dates are never recent; future dates always are.
#[must_use]
pub fn is_recent_release(release: Option<NaiveDate>, now: DateTime<Utc>, window_days: u32) -> bool {
    release.is_some_and(|date| release_age_days(date, now) <= i64::from(window_days))
}
