//! Scrape Worker
//!
//! Long-running queue consumer: claims `scrape` jobs from the `jobs` table
//! and runs them against the mapping provider until Ctrl-C.

use anyhow::{Context, Result};
use scraper_core::kernel::jobs::{JobWorker, JobWorkerConfig};
use scraper_core::kernel::ServerDeps;
use scraper_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scraper_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting scrape worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections((config.worker_batch_size as u32).max(1) + 2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations applied");

    let deps = ServerDeps::from_config(&config, pool)?;

    let worker_config = JobWorkerConfig {
        batch_size: config.worker_batch_size,
        poll_interval: config.worker_poll_interval,
        ..Default::default()
    };
    let worker =
        JobWorker::new(deps.job_queue.clone(), worker_config).register(deps.scrape_handler());

    tracing::info!(
        max_pages = deps.settings.max_pages,
        page_token_delay_ms = deps.settings.page_token_delay.as_millis() as u64,
        details_concurrency = deps.settings.details_concurrency,
        "Scrape settings"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown requested, finishing in-flight jobs");
        signal.cancel();
    });

    let handle = tokio::spawn(worker.run(shutdown));
    handle.await.context("Worker task panicked")??;

    Ok(())
}
