use serde::Deserialize;
use tracing::info;

use super::search_places::{DEFAULT_CATEGORY, DEFAULT_RADIUS};
use crate::common::UserId;
use crate::domains::scraping::error::ScrapeError;
use crate::domains::scraping::job_handler::SCRAPE_JOB_TYPE;
use crate::domains::scraping::models::{NewScrapeJob, ScrapeJob};
use crate::domains::scraping::processor::ScrapeJobPayload;
use crate::domains::scraping::store::ScrapeJobStore;
use crate::kernel::jobs::JobQueue;

/// A user's request to scrape places around a location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScrapeRequest {
    pub location: String,
    #[serde(default)]
    pub radius: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Create a PENDING scrape job and enqueue it for the worker.
///
/// The queue job id is recorded on the scrape job so operators can correlate
/// the two.
pub async fn submit_scrape(
    request: SubmitScrapeRequest,
    store: &dyn ScrapeJobStore,
    queue: &dyn JobQueue,
    max_attempts: i32,
) -> anyhow::Result<ScrapeJob> {
    let location = request.location.trim().to_string();
    if location.is_empty() {
        return Err(ScrapeError::InvalidRequest("location can't be empty".to_string()).into());
    }

    let radius = request.radius.filter(|r| *r > 0).unwrap_or(DEFAULT_RADIUS);
    let category = request
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let mut new_job = NewScrapeJob::builder()
        .keyword(category.clone().unwrap_or_else(|| DEFAULT_CATEGORY.to_string()))
        .location(location.clone())
        .radius(i32::try_from(radius)?)
        .build();
    new_job.user_id = request.user_id;

    let mut job = store.create_job(new_job).await?;

    let payload = ScrapeJobPayload {
        location,
        radius: Some(radius),
        category,
        scrape_job_id: job.id,
    };
    let queue_job_id = queue
        .enqueue(SCRAPE_JOB_TYPE, serde_json::to_value(&payload)?, max_attempts)
        .await?;

    store.attach_queue_job(job.id, queue_job_id).await?;
    job.queue_job_id = Some(queue_job_id);

    info!(
        scrape_job_id = %job.id,
        queue_job_id = %queue_job_id,
        location = %job.location,
        radius,
        "Scrape job submitted"
    );

    Ok(job)
}
