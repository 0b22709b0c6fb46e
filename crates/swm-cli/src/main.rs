mod pipeline;
mod report;

use clap::{Parser, Subcommand};
use swm_core::MappingStatus;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "swm-cli")]
#[command(about = "Steam to CheapShark mapping pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Manage the local Steam app catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Queue apps for mapping
    Enqueue {
        /// Steam app ids to queue
        app_ids: Vec<String>,
        /// Queue catalog apps that have never been attempted instead
        #[arg(long, conflicts_with = "app_ids")]
        never_attempted: bool,
        /// Maximum number of catalog apps to queue with --never-attempted
        #[arg(long, default_value = "1000")]
        limit: i64,
        /// Queue priority (higher runs first)
        #[arg(long, default_value_t = swm_mapper::priority::DEFAULT)]
        priority: i64,
    },
    /// Process queued jobs once
    Process {
        /// Jobs claimed per batch (defaults to SWM_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<u32>,
        /// Keep running batches until the queue is empty
        #[arg(long)]
        drain: bool,
        /// Stop draining after this many jobs
        #[arg(long, requires = "drain")]
        max_items: Option<u32>,
        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the scheduler until interrupted
    Run,
    /// Show the mapping status of individual apps
    Status {
        /// Steam app ids to inspect
        #[arg(required = true)]
        app_ids: Vec<String>,
    },
    /// Show mapping coverage and queue statistics
    Stats,
    /// Forget stored mappings so the apps read as never attempted
    Reset {
        /// Steam app ids to reset
        #[arg(required = true)]
        app_ids: Vec<String>,
        /// Queue the apps again after resetting them
        #[arg(long)]
        requeue: bool,
        /// Queue priority used with --requeue
        #[arg(long, default_value_t = swm_mapper::priority::DEFAULT)]
        priority: i64,
        /// Reason recorded in the log
        #[arg(long, default_value = "manual reset")]
        reason: String,
    },
    /// Re-queue mappings matching status, age and attempt criteria
    Retry {
        /// Statuses to match (found, not_found, too_new, failed)
        #[arg(long = "status", required = true, value_parser = parse_status)]
        statuses: Vec<MappingStatus>,
        /// Only mappings last attempted more than this many days ago
        #[arg(long)]
        older_than_days: Option<u32>,
        /// Only mappings with at least this many attempts
        #[arg(long)]
        min_attempts: Option<i64>,
        /// Only mappings with at most this many attempts
        #[arg(long)]
        max_attempts: Option<i64>,
        /// Maximum number of mappings to re-queue
        #[arg(long)]
        limit: Option<i64>,
        /// Queue priority for the new jobs
        #[arg(long, default_value_t = swm_mapper::priority::DEFAULT)]
        priority: i64,
    },
    /// Remove old finished jobs and recover stuck ones
    Cleanup {
        /// Keep finished jobs newer than this many days (defaults to SWM_QUEUE_RETENTION_DAYS)
        #[arg(long)]
        retention_days: Option<u32>,
        /// Recover jobs processing longer than this (defaults to SWM_STALE_JOB_MINUTES)
        #[arg(long)]
        stale_minutes: Option<u32>,
    },
}

#[derive(Debug, Subcommand)]
enum CatalogCommands {
    /// Add or update a Steam app
    Add {
        app_id: String,
        #[arg(long)]
        name: String,
        /// Release date as shown by Steam, e.g. 2024-03-01 or "21 Jul, 2016"
        #[arg(long)]
        release_date: Option<String>,
    },
}

fn parse_status(raw: &str) -> Result<MappingStatus, String> {
    match raw.parse::<MappingStatus>() {
        Ok(MappingStatus::Unknown) => Err("unknown mappings are never stored".to_string()),
        Ok(status) => Ok(status),
        Err(e) => Err(e.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("swm-cli ready; run `swm-cli --help` for commands");
        return Ok(());
    };

    let config = swm_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = swm_db::PoolConfig::from_app_config(&config);
    let pool = swm_db::connect_pool(&config.database_url, pool_config).await?;

    if !matches!(command, Commands::Migrate) {
        swm_db::run_migrations(&pool).await?;
    }

    match command {
        Commands::Migrate => {
            let applied = swm_db::run_migrations(&pool).await?;
            println!("applied {applied} new migration(s)");
        }
        Commands::Catalog {
            command:
                CatalogCommands::Add {
                    app_id,
                    name,
                    release_date,
                },
        } => {
            pipeline::run_catalog_add(&pool, &app_id, &name, release_date.as_deref()).await?;
        }
        Commands::Enqueue {
            app_ids,
            never_attempted,
            limit,
            priority,
        } => {
            let target = if never_attempted {
                pipeline::EnqueueTarget::NeverAttempted { limit }
            } else {
                pipeline::EnqueueTarget::Apps(app_ids)
            };
            pipeline::run_enqueue(&pool, &config, target, priority).await?;
        }
        Commands::Process {
            batch_size,
            drain,
            max_items,
            json,
        } => {
            let batch_size = batch_size.unwrap_or(config.batch_size);
            pipeline::run_process(&pool, &config, batch_size, drain, max_items, json).await?;
        }
        Commands::Run => pipeline::run_scheduler(pool, &config).await?,
        Commands::Status { app_ids } => report::run_status(&pool, &app_ids).await?,
        Commands::Stats => report::run_stats(&pool, &config).await?,
        Commands::Reset {
            app_ids,
            requeue,
            priority,
            reason,
        } => {
            let requeue_priority = requeue.then_some(priority);
            pipeline::run_reset(&pool, &config, &app_ids, requeue_priority, &reason).await?;
        }
        Commands::Retry {
            statuses,
            older_than_days,
            min_attempts,
            max_attempts,
            limit,
            priority,
        } => {
            let filter = swm_db::StatusQuery {
                older_than: older_than_days
                    .map(|days| chrono::Utc::now() - chrono::Duration::days(i64::from(days))),
                min_attempts,
                max_attempts,
                limit,
            };
            pipeline::run_retry(&pool, &config, &statuses, filter, priority).await?;
        }
        Commands::Cleanup {
            retention_days,
            stale_minutes,
        } => {
            pipeline::run_cleanup(
                &pool,
                retention_days.unwrap_or(config.queue_retention_days),
                stale_minutes.unwrap_or(config.stale_job_minutes),
            )
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
