use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

const DEFAULT_DATABASE_URL: &str = "sqlite://steam_wishlist.db";
const DEFAULT_CHEAPSHARK_BASE_URL: &str = "https://www.cheapshark.com/api/1.0";
const DEFAULT_USER_AGENT: &str = "SteamWishlistManager/2.0";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = or_default("DATABASE_URL", DEFAULT_DATABASE_URL);
    let env = parse_environment(&or_default("SWM_ENV", "development"))?;
    let log_level = or_default("SWM_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("SWM_DB_MAX_CONNECTIONS", "5")?;
    let db_acquire_timeout_secs = parse_u64("SWM_DB_ACQUIRE_TIMEOUT_SECS", "30")?;

    let cheapshark_base_url = or_default("CHEAPSHARK_BASE_URL", DEFAULT_CHEAPSHARK_BASE_URL);
    let lookup_timeout_secs = parse_u64("SWM_LOOKUP_TIMEOUT_SECS", "15")?;
    let lookup_min_interval_ms = parse_u64("SWM_LOOKUP_MIN_INTERVAL_MS", "1500")?;
    let user_agent = or_default("SWM_USER_AGENT", DEFAULT_USER_AGENT);

    let batch_size = parse_u32("SWM_BATCH_SIZE", "10")?;
    let process_interval_minutes = parse_u64("SWM_PROCESS_INTERVAL_MINUTES", "10")?;
    let queue_max_retries = parse_u32("SWM_QUEUE_MAX_RETRIES", "3")?;
    let max_attempts = parse_u32("SWM_MAX_ATTEMPTS", "5")?;

    let recent_release_days = parse_u32("SWM_RECENT_RELEASE_DAYS", "30")?;
    let too_new_recheck_days = parse_u32("SWM_TOO_NEW_RECHECK_DAYS", "60")?;
    let too_new_interval_hours = parse_u64("SWM_TOO_NEW_INTERVAL_HOURS", "24")?;
    let failed_retry_days = parse_u32("SWM_FAILED_RETRY_DAYS", "7")?;
    let failed_retry_interval_hours = parse_u64("SWM_FAILED_RETRY_INTERVAL_HOURS", "24")?;
    let not_found_retry_days = parse_u32("SWM_NOT_FOUND_RETRY_DAYS", "30")?;
    let not_found_interval_hours = parse_u64("SWM_NOT_FOUND_INTERVAL_HOURS", "168")?;
    let cleanup_interval_hours = parse_u64("SWM_CLEANUP_INTERVAL_HOURS", "24")?;
    let queue_retention_days = parse_u32("SWM_QUEUE_RETENTION_DAYS", "7")?;
    let stale_job_minutes = parse_u32("SWM_STALE_JOB_MINUTES", "60")?;

    let config = AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_acquire_timeout_secs,
        cheapshark_base_url,
        lookup_timeout_secs,
        lookup_min_interval_ms,
        user_agent,
        batch_size,
        process_interval_minutes,
        queue_max_retries,
        max_attempts,
        recent_release_days,
        too_new_recheck_days,
        too_new_interval_hours,
        failed_retry_days,
        failed_retry_interval_hours,
        not_found_retry_days,
        not_found_interval_hours,
        cleanup_interval_hours,
        queue_retention_days,
        stale_job_minutes,
    };

    validate(&config)?;
    Ok(config)
}

/// Reject combinations that would make the scheduler spin or never dequeue.
fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "SWM_BATCH_SIZE must be at least 1".to_string(),
        ));
    }
    if config.queue_max_retries == 0 {
        return Err(ConfigError::Validation(
            "SWM_QUEUE_MAX_RETRIES must be at least 1".to_string(),
        ));
    }
    let intervals = [
        ("SWM_PROCESS_INTERVAL_MINUTES", config.process_interval_minutes),
        ("SWM_TOO_NEW_INTERVAL_HOURS", config.too_new_interval_hours),
        (
            "SWM_FAILED_RETRY_INTERVAL_HOURS",
            config.failed_retry_interval_hours,
        ),
        ("SWM_NOT_FOUND_INTERVAL_HOURS", config.not_found_interval_hours),
        ("SWM_CLEANUP_INTERVAL_HOURS", config.cleanup_interval_hours),
    ];
    if let Some((var, _)) = intervals.iter().find(|(_, v)| *v == 0) {
        return Err(ConfigError::Validation(format!("{var} must be at least 1")));
    }
    if config.too_new_recheck_days <= config.recent_release_days {
        return Err(ConfigError::Validation(
            "SWM_TOO_NEW_RECHECK_DAYS must be greater than SWM_RECENT_RELEASE_DAYS".to_string(),
        ));
    }
    Ok(())
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        "test" => Ok(Environment::Test),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SWM_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
