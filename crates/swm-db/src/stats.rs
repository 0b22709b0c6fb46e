use sqlx::SqlitePool;
use swm_core::MappingStatus;

use crate::{queue::queue_counts, DbError, QueueCounts};

/// Overview of mapping coverage across the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MappingStats {
    pub total_apps: i64,
    pub attempted: i64,
    pub never_attempted: i64,
    pub found: i64,
    pub not_found: i64,
    pub too_new: i64,
    pub failed: i64,
    /// Found mappings as a share of the catalog, in percent.
    pub coverage_pct: f64,
    /// Found mappings as a share of attempted apps, in percent.
    pub success_rate_pct: f64,
    pub queue: QueueCounts,
}

/// Collects mapping and queue statistics.
///
/// # Errors
///
/// Returns [`DbError`] if any of the underlying queries fail.
pub async fn mapping_stats(pool: &SqlitePool, max_retries: u32) -> Result<MappingStats, DbError> {
    let total_apps = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM apps")
        .fetch_one(pool)
        .await?;
    let never_attempted = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM apps a \
         WHERE NOT EXISTS (SELECT 1 FROM cheapshark_mappings m WHERE m.app_id = a.app_id)",
    )
    .fetch_one(pool)
    .await?;
    let by_status = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM cheapshark_mappings GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    let mut stats = MappingStats {
        total_apps,
        never_attempted,
        queue: queue_counts(pool, max_retries).await?,
        ..MappingStats::default()
    };
    for (status, count) in by_status {
        stats.attempted += count;
        match status.parse::<MappingStatus>()? {
            MappingStatus::Found => stats.found = count,
            MappingStatus::NotFound => stats.not_found = count,
            MappingStatus::TooNew => stats.too_new = count,
            MappingStatus::Failed => stats.failed = count,
            MappingStatus::Unknown => {}
        }
    }
    stats.coverage_pct = percent(stats.found, stats.total_apps);
    stats.success_rate_pct = percent(stats.found, stats.attempted);

    Ok(stats)
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_empty_whole_is_zero() {
        assert!(percent(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_scales_to_hundred() {
        assert!((percent(1, 4) - 25.0).abs() < 1e-9);
    }
}
