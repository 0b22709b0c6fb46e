//! Read-only reporting commands.

use sqlx::SqlitePool;
use swm_core::{AppConfig, AppId};

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Print the stored mapping, if any, and the latest queue job for each app.
///
/// # Errors
///
/// Returns an error if any id is malformed or a query fails.
pub(crate) async fn run_status(pool: &SqlitePool, raw_ids: &[String]) -> anyhow::Result<()> {
    let app_ids = AppId::parse_all(raw_ids)?;

    let header = format!(
        "{:<12}{:<11}{:<10}{:<12}{:<22}JOB",
        "APP", "STATUS", "ATTEMPTS", "GAME", "LAST ATTEMPT"
    );
    println!("{header}");

    for app_id in &app_ids {
        let view = swm_db::get_mapping_status(pool, app_id).await?;
        let game_id = if view.attempted {
            swm_db::get_mapping(pool, app_id).await?.cheapshark_game_id
        } else {
            None
        };
        let job = swm_db::list_jobs_for_app(pool, app_id)
            .await?
            .pop()
            .map(|job| format!("{} (retries {})", job.status.as_str(), job.retry_count));
        let last_attempt = view
            .last_attempt
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string());

        println!(
            "{:<12}{:<11}{:<10}{:<12}{:<22}{}",
            app_id.as_str(),
            view.status.as_str(),
            view.attempts,
            fmt_opt(game_id),
            fmt_opt(last_attempt),
            fmt_opt(job),
        );
    }

    Ok(())
}

/// Print catalog coverage, outcome counts, and queue depth.
///
/// # Errors
///
/// Returns an error if the statistics query fails.
pub(crate) async fn run_stats(pool: &SqlitePool, config: &AppConfig) -> anyhow::Result<()> {
    let stats = swm_db::mapping_stats(pool, config.queue_max_retries).await?;

    println!("Catalog");
    println!("  apps              {}", stats.total_apps);
    println!("  attempted         {}", stats.attempted);
    println!("  never attempted   {}", stats.never_attempted);
    println!("  coverage          {:.1}%", stats.coverage_pct);
    println!();
    println!("Mappings");
    println!("  found             {}", stats.found);
    println!("  not found         {}", stats.not_found);
    println!("  too new           {}", stats.too_new);
    println!("  failed            {}", stats.failed);
    println!("  success rate      {:.1}%", stats.success_rate_pct);
    println!();
    println!("Queue");
    println!("  pending           {}", stats.queue.pending);
    println!("  processing        {}", stats.queue.processing);
    println!("  completed         {}", stats.queue.completed);
    println!("  failed            {}", stats.queue.failed);
    println!("  exhausted         {}", stats.queue.exhausted);

    Ok(())
}
