//! HTTP client for the `CheapShark` `games` API.
//!
//! Wraps `reqwest` with a shared [`RateLimiter`] and classifies each Steam app
//! id into a [`LookupOutcome`]. A found game is enriched with its price
//! history from a second call; that call is best effort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use swm_core::{AppConfig, AppId, LookupOutcome, MappingDetails, MappingLookup};

use crate::error::CheapsharkError;
use crate::rate_limit::RateLimiter;
use crate::types::{GameDetails, GameSearchEntry};

pub const DEFAULT_BASE_URL: &str = "https://www.cheapshark.com/api/1.0/";
const CONNECT_TIMEOUT_SECS: u64 = 10;
const ENRICHMENT_TIMEOUT_SECS: u64 = 10;

/// Client for the `CheapShark` REST API.
///
/// Cloning is cheap and clones share the same connection pool and rate
/// limiter. Use [`CheapsharkClient::new`] for production or
/// [`CheapsharkClient::with_base_url`] to point at a mock server in tests.
#[derive(Debug, Clone)]
pub struct CheapsharkClient {
    client: Client,
    games_url: Url,
    limiter: Arc<RateLimiter>,
}

impl CheapsharkClient {
    /// Creates a client pointed at the public `CheapShark` API.
    ///
    /// # Errors
    ///
    /// Returns [`CheapsharkError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        min_interval: Duration,
    ) -> Result<Self, CheapsharkError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout_secs, user_agent, min_interval)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`CheapsharkError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`CheapsharkError::InvalidBaseUrl`] if `base_url` does
    /// not parse.
    pub fn with_base_url(
        base_url: &str,
        timeout_secs: u64,
        user_agent: &str,
        min_interval: Duration,
    ) -> Result<Self, CheapsharkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()?;

        // Exactly one trailing slash, so `join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let games_url = Url::parse(&normalised)
            .and_then(|base| base.join("games"))
            .map_err(|e| CheapsharkError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            games_url,
            limiter: Arc::new(RateLimiter::new(min_interval)),
        })
    }

    /// Builds a client from the application config.
    ///
    /// # Errors
    ///
    /// See [`CheapsharkClient::with_base_url`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, CheapsharkError> {
        Self::with_base_url(
            &config.cheapshark_base_url,
            config.lookup_timeout_secs,
            &config.user_agent,
            Duration::from_millis(config.lookup_min_interval_ms),
        )
    }

    /// Lists `CheapShark` games linked to a Steam app id.
    ///
    /// # Errors
    ///
    /// - [`CheapsharkError::UnexpectedStatus`] on a non-2xx response.
    /// - [`CheapsharkError::Http`] on network failure or timeout.
    /// - [`CheapsharkError::Deserialize`] if the body is not a game list.
    pub async fn search_by_steam_app(
        &self,
        app_id: &AppId,
    ) -> Result<Vec<GameSearchEntry>, CheapsharkError> {
        let url = self.games_url_with("steamAppID", app_id.as_str());
        self.get_json(url, None).await
    }

    /// Fetches price history and current deals for a `CheapShark` game.
    ///
    /// # Errors
    ///
    /// Same as [`CheapsharkClient::search_by_steam_app`].
    pub async fn game_details(&self, game_id: &str) -> Result<GameDetails, CheapsharkError> {
        let url = self.games_url_with("id", game_id);
        self.get_json(url, Some(Duration::from_secs(ENRICHMENT_TIMEOUT_SECS)))
            .await
    }

    /// Classifies `app_id` as found, not found, or a transient API error.
    ///
    /// An empty result list is `NotFound`; the first candidate wins when
    /// several are returned. Enrichment failures are logged and ignored.
    pub async fn classify(&self, app_id: &AppId) -> LookupOutcome {
        let candidates = match self.search_by_steam_app(app_id).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(app_id = %app_id, error = %e, "CheapShark lookup failed");
                return LookupOutcome::ApiError(e.to_failure());
            }
        };

        let Some(first) = candidates.into_iter().next() else {
            tracing::debug!(app_id = %app_id, "no CheapShark game for app");
            return LookupOutcome::NotFound;
        };

        let mut details = MappingDetails {
            thumb_url: first.thumb,
            ..MappingDetails::bare(first.game_id)
        };

        match self.game_details(&details.cheapshark_game_id).await {
            Ok(extra) => apply_enrichment(&mut details, &extra),
            Err(e) => tracing::debug!(
                app_id = %app_id,
                game_id = %details.cheapshark_game_id,
                error = %e,
                "enrichment failed; keeping bare mapping"
            ),
        }

        tracing::debug!(
            app_id = %app_id,
            game_id = %details.cheapshark_game_id,
            deals = details.deals_count,
            "CheapShark game found"
        );
        LookupOutcome::Found(details)
    }

    fn games_url_with(&self, key: &str, value: &str) -> Url {
        let mut url = self.games_url.clone();
        url.query_pairs_mut().append_pair(key, value);
        url
    }

    /// Waits for the rate limiter, sends a GET, asserts a 2xx status, and
    /// parses the body as JSON.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        timeout: Option<Duration>,
    ) -> Result<T, CheapsharkError> {
        self.limiter.acquire().await;

        let mut request = self.client.get(url.clone());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheapsharkError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| CheapsharkError::Deserialize {
            context: url.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl MappingLookup for CheapsharkClient {
    async fn lookup(&self, app_id: &AppId) -> LookupOutcome {
        self.classify(app_id).await
    }
}

/// Copies price history from a game detail response into `details`.
///
/// The cheapest store falls back to the store of the cheapest current deal
/// when the history entry does not name one.
fn apply_enrichment(details: &mut MappingDetails, extra: &GameDetails) {
    if details.thumb_url.is_none() {
        details.thumb_url = extra.info.as_ref().and_then(|info| info.thumb.clone());
    }

    if let Some(cheapest) = &extra.cheapest_price_ever {
        details.cheapest_price_ever = cheapest.price.as_deref().and_then(parse_price);
        details.cheapest_price_date = cheapest.date.and_then(unix_to_date);
        details.cheapest_store = cheapest.store.clone();
    }
    if details.cheapest_store.is_none() {
        details.cheapest_store = extra
            .deals
            .iter()
            .filter_map(|deal| Some((deal.price.as_deref().and_then(parse_price)?, deal)))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .and_then(|(_, deal)| deal.store_id.clone());
    }

    details.deals_count = i64::try_from(extra.deals.len()).unwrap_or(i64::MAX);
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|p| p.is_finite() && *p >= 0.0)
}

fn unix_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}
