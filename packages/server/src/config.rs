use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::scraping::{MIN_PAGE_TOKEN_DELAY, ScrapeSettings};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub google_maps_api_key: String,
    pub maps_base_url: String,
    pub maps_http_timeout: Duration,
    pub page_token_delay: Duration,
    pub max_search_pages: usize,
    pub details_concurrency: usize,
    pub job_max_attempts: i32,
    pub worker_batch_size: i64,
    pub worker_poll_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let page_token_delay_ms: u64 = parse_or("PAGE_TOKEN_DELAY_MS", 2000)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY")
                .context("GOOGLE_MAPS_API_KEY must be set")?,
            maps_base_url: env::var("MAPS_BASE_URL")
                .unwrap_or_else(|_| maps_client::DEFAULT_BASE_URL.to_string()),
            maps_http_timeout: Duration::from_secs(parse_or("MAPS_HTTP_TIMEOUT_SECS", 20)?),
            page_token_delay: Duration::from_millis(page_token_delay_ms).max(MIN_PAGE_TOKEN_DELAY),
            max_search_pages: parse_or("MAX_SEARCH_PAGES", 50)?,
            details_concurrency: parse_or::<usize>("DETAILS_CONCURRENCY", 1)?.max(1),
            job_max_attempts: parse_or("JOB_MAX_ATTEMPTS", 3)?,
            worker_batch_size: parse_or("WORKER_BATCH_SIZE", 4)?,
            worker_poll_interval: Duration::from_secs(parse_or("WORKER_POLL_INTERVAL_SECS", 5)?),
        })
    }

    /// Scrape tuning derived from this configuration.
    pub fn scrape_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            page_token_delay: self.page_token_delay,
            max_pages: self.max_search_pages,
            details_concurrency: self.details_concurrency,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
