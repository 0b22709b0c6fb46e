//! Classification contract for the external mapping service.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::AppId;

/// Data captured when an app resolves to a `CheapShark` game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDetails {
    pub cheapshark_game_id: String,
    pub thumb_url: Option<String>,
    pub cheapest_price_ever: Option<f64>,
    pub cheapest_price_date: Option<NaiveDate>,
    pub cheapest_store: Option<String>,
    pub deals_count: i64,
}

impl MappingDetails {
    /// Details with only the game id known; enrichment fields empty.
    #[must_use]
    pub fn bare(cheapshark_game_id: impl Into<String>) -> Self {
        Self {
            cheapshark_game_id: cheapshark_game_id.into(),
            thumb_url: None,
            cheapest_price_ever: None,
            cheapest_price_date: None,
            cheapest_store: None,
            deals_count: 0,
        }
    }
}

/// A transient failure talking to the mapping service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub message: String,
    /// Set only when the service answered with a non-2xx status.
    pub http_status: Option<u16>,
}

impl ApiFailure {
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: Some(status),
        }
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: None,
        }
    }

    #[must_use]
    pub fn is_http_error(&self) -> bool {
        self.http_status.is_some()
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Result of classifying one app against the mapping service.
///
/// `NotFound` is a durable fact; `ApiError` is transient and retry-eligible.
/// The two must never be merged.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(MappingDetails),
    NotFound,
    ApiError(ApiFailure),
}

/// Something that can classify a Steam app id against the mapping service.
#[async_trait]
pub trait MappingLookup: Send + Sync {
    async fn lookup(&self, app_id: &AppId) -> LookupOutcome;
}

#[async_trait]
impl<T: MappingLookup + ?Sized> MappingLookup for std::sync::Arc<T> {
    async fn lookup(&self, app_id: &AppId) -> LookupOutcome {
        (**self).lookup(app_id).await
    }
}
