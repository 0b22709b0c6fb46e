use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregate statistics for one processed batch.
///
/// Every processed job lands in exactly one of `successful`, `not_found`,
/// `too_new` or `failed`, so `processed` always equals their sum. `api_errors`
/// is a subset of `failed` and `skipped` a subset of `successful`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub processed: u32,
    pub successful: u32,
    pub not_found: u32,
    pub too_new: u32,
    pub failed: u32,
    pub api_errors: u32,
    pub skipped: u32,
    pub timestamp: DateTime<Utc>,
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl BatchResult {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            processed: 0,
            successful: 0,
            not_found: 0,
            too_new: 0,
            failed: 0,
            api_errors: 0,
            skipped: 0,
            timestamp,
        }
    }

    pub fn record_found(&mut self) {
        self.processed += 1;
        self.successful += 1;
    }

    /// A job completed without a lookup because the app was already mapped.
    pub fn record_skipped(&mut self) {
        self.record_found();
        self.skipped += 1;
    }

    pub fn record_no_mapping(&mut self, too_new: bool) {
        self.processed += 1;
        if too_new {
            self.too_new += 1;
        } else {
            self.not_found += 1;
        }
    }

    pub fn record_failed(&mut self, http_error: bool) {
        self.processed += 1;
        self.failed += 1;
        if http_error {
            self.api_errors += 1;
        }
    }

    /// Fold another batch into this one, keeping the later timestamp.
    pub fn absorb(&mut self, other: &BatchResult) {
        self.processed += other.processed;
        self.successful += other.successful;
        self.not_found += other.not_found;
        self.too_new += other.too_new;
        self.failed += other.failed;
        self.api_errors += other.api_errors;
        self.skipped += other.skipped;
        self.timestamp = self.timestamp.max(other.timestamp);
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.processed == self.successful + self.not_found + self.too_new + self.failed
            && self.api_errors <= self.failed
            && self.skipped <= self.successful
    }

}
