//! Test fixtures for creating test data.
//!
//! These fixtures use the model methods directly to create test data.

use anyhow::Result;
use scraper_core::common::ScrapeJobId;
use scraper_core::domains::scraping::{
    NewPlaceRecord, NewScrapeJob, PlaceRecord, ScrapeJob, ScrapeJobPayload,
};
use sqlx::PgPool;

/// Parameters for a PENDING job. Locations are made unique per call so tests
/// sharing the database can find their own rows.
pub fn new_job(location: &str) -> NewScrapeJob {
    NewScrapeJob::builder()
        .keyword("restaurant")
        .location(format!("{} {}", location, ScrapeJobId::new()))
        .radius(1500)
        .build()
}

/// Create a PENDING scrape job
pub async fn create_test_job(pool: &PgPool, location: &str) -> Result<ScrapeJob> {
    Ok(ScrapeJob::insert(new_job(location), pool).await?)
}

/// Create a place record owned by `job_id`
pub async fn create_test_place(pool: &PgPool, job_id: ScrapeJobId, name: &str) -> Result<PlaceRecord> {
    let place = NewPlaceRecord {
        scrape_job_id: job_id,
        name: name.to_string(),
        address: "Jl. Braga No. 1".to_string(),
        phone: "-".to_string(),
        website: "-".to_string(),
        source: "https://maps.google.com/?cid=1".to_string(),
        industry: vec!["restaurant".to_string(), "food".to_string()],
        rating: Some(4.5),
        review_count: 12,
    };
    Ok(PlaceRecord::insert(place, pool).await?)
}

/// Queue payload for an existing job
pub fn payload_for(job: &ScrapeJob) -> ScrapeJobPayload {
    ScrapeJobPayload {
        location: job.location.clone(),
        radius: u32::try_from(job.radius).ok(),
        category: Some(job.keyword.clone()),
        scrape_job_id: job.id,
    }
}
