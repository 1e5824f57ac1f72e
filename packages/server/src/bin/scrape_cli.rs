//! Operator CLI for scrape jobs
//!
//! Submits scrapes and reads job status. Prints one JSON document per
//! invocation so the output can be piped into other tools.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use scraper_core::common::{OffsetPage, PageRequest, ScrapeJobId};
use scraper_core::domains::scraping::{
    submit_scrape, PlaceRecord, PostgresScrapeJobStore, ScrapeJob, ScrapeJobStore,
    SubmitScrapeRequest,
};
use scraper_core::kernel::jobs::PostgresJobQueue;
use scraper_core::Config;
use sqlx::PgPool;

#[derive(Parser)]
#[command(name = "scrape_cli")]
#[command(about = "Submit place scrapes and inspect their status")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a scrape job and enqueue it
    Submit {
        #[arg(long)]
        location: String,
        /// Search radius in meters (default 1500)
        #[arg(long)]
        radius: Option<u32>,
        /// Search keyword (default "restaurant")
        #[arg(long)]
        category: Option<String>,
    },

    /// Show one job with its place count
    Status { id: String },

    /// List recent jobs, newest first
    List {
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show the place records of a job
    Places { id: String },
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize)]
struct Response {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<ScrapeJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    place_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<OffsetPage<ScrapeJob>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    places: Option<Vec<PlaceRecord>>,
}

impl Response {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
            job: None,
            place_count: None,
            jobs: None,
            places: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::ok()
        }
    }
}

fn output(resp: Response) -> Result<()> {
    println!("{}", serde_json::to_string(&resp)?);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Submit {
            location,
            radius,
            category,
        } => cmd_submit(&config, pool, location, radius, category).await,
        Commands::Status { id } => cmd_status(pool, &id).await,
        Commands::List { page, limit } => cmd_list(pool, page, limit).await,
        Commands::Places { id } => cmd_places(pool, &id).await,
    }
}

fn parse_id(id: &str) -> Result<ScrapeJobId> {
    ScrapeJobId::parse(id).with_context(|| format!("'{}' is not a valid job id", id))
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_submit(
    config: &Config,
    pool: PgPool,
    location: String,
    radius: Option<u32>,
    category: Option<String>,
) -> Result<()> {
    let store = PostgresScrapeJobStore::new(pool.clone());
    let queue = PostgresJobQueue::new(pool);

    let request = SubmitScrapeRequest {
        location,
        radius,
        category,
        user_id: None,
    };

    match submit_scrape(request, &store, &queue, config.job_max_attempts).await {
        Ok(job) => output(Response {
            job: Some(job),
            ..Response::ok()
        }),
        Err(e) => output(Response::error(format!("{:#}", e))),
    }
}

async fn cmd_status(pool: PgPool, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let store = PostgresScrapeJobStore::new(pool);

    let job = match store.find_job(id).await {
        Ok(job) => job,
        Err(e) => return output(Response::error(e.to_string())),
    };
    let place_count = store.count_places(id).await?;

    output(Response {
        job: Some(job),
        place_count: Some(place_count),
        ..Response::ok()
    })
}

async fn cmd_list(pool: PgPool, page: Option<i64>, limit: Option<i64>) -> Result<()> {
    let request = PageRequest::new(page, limit);
    let jobs = ScrapeJob::list_recent(&request, &pool).await?;

    output(Response {
        jobs: Some(jobs),
        ..Response::ok()
    })
}

async fn cmd_places(pool: PgPool, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let places = PlaceRecord::find_by_job(id, &pool).await?;

    output(Response {
        place_count: Some(places.len() as i64),
        places: Some(places),
        ..Response::ok()
    })
}
