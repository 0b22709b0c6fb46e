#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Runtime configuration for the mapping pipeline, read from the environment.
///
/// Durations are kept in the unit of their env var (days, hours, minutes,
/// milliseconds) and converted at the point of use.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub cheapshark_base_url: String,
    pub lookup_timeout_secs: u64,
    pub lookup_min_interval_ms: u64,
    pub user_agent: String,

    pub batch_size: u32,
    pub process_interval_minutes: u64,
    /// Cap on `retry_count` for queue jobs.
    pub queue_max_retries: u32,
    /// Cap on mapping `attempts` for the failed-retry scan.
    pub max_attempts: u32,

    pub recent_release_days: u32,
    pub too_new_recheck_days: u32,
    pub too_new_interval_hours: u64,
    pub failed_retry_days: u32,
    pub failed_retry_interval_hours: u64,
    pub not_found_retry_days: u32,
    pub not_found_interval_hours: u64,
    pub cleanup_interval_hours: u64,
    pub queue_retention_days: u32,
    pub stale_job_minutes: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("cheapshark_base_url", &self.cheapshark_base_url)
            .field("lookup_timeout_secs", &self.lookup_timeout_secs)
            .field("lookup_min_interval_ms", &self.lookup_min_interval_ms)
            .field("user_agent", &self.user_agent)
            .field("batch_size", &self.batch_size)
            .field("process_interval_minutes", &self.process_interval_minutes)
            .field("queue_max_retries", &self.queue_max_retries)
            .field("max_attempts", &self.max_attempts)
            .field("recent_release_days", &self.recent_release_days)
            .field("too_new_recheck_days", &self.too_new_recheck_days)
            .field("too_new_interval_hours", &self.too_new_interval_hours)
            .field("failed_retry_days", &self.failed_retry_days)
            .field(
                "failed_retry_interval_hours",
                &self.failed_retry_interval_hours,
            )
            .field("not_found_retry_days", &self.not_found_retry_days)
            .field("not_found_interval_hours", &self.not_found_interval_hours)
            .field("cleanup_interval_hours", &self.cleanup_interval_hours)
            .field("queue_retention_days", &self.queue_retention_days)
            .field("stale_job_minutes", &self.stale_job_minutes)
            .finish()
    }
}
