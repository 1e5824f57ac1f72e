//! Queue adapter for scrape jobs.
//!
//! A delivery names a scrape job row. Terminal rows are never reused, so a
//! redelivered message (backoff retry, or reclaim after a worker crash) runs
//! against a fresh PENDING row that points back at the original through
//! `retry_of`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::error::ScrapeError;
use super::models::ScrapeJobStatus;
use super::processor::{ScrapeJobPayload, ScrapeJobProcessor};
use super::store::ScrapeJobStore;
use crate::kernel::jobs::{ClaimedJob, JobFailure, JobHandler};

pub const SCRAPE_JOB_TYPE: &str = "scrape";

pub struct ScrapeJobHandler {
    store: Arc<dyn ScrapeJobStore>,
    processor: ScrapeJobProcessor,
}

impl ScrapeJobHandler {
    pub fn new(processor: ScrapeJobProcessor) -> Self {
        Self {
            store: processor.store().clone(),
            processor,
        }
    }

    /// Pick the row this delivery runs against.
    ///
    /// The payload names the first row of a retry chain; the newest row of
    /// that chain decides what happens:
    /// - PENDING: run it as is.
    /// - RUNNING: a previous worker died mid-job; fail it, then re-run on a new row.
    /// - COMPLETED / FAILED: re-run on a new row.
    async fn prepare_delivery(
        &self,
        payload: ScrapeJobPayload,
    ) -> Result<ScrapeJobPayload, ScrapeError> {
        let named = self.store.find_job(payload.scrape_job_id).await?;
        let root = named.retry_of.unwrap_or(named.id);
        let job = self.store.find_latest_attempt(root).await?;

        match job.status {
            ScrapeJobStatus::Pending => return Ok(payload.for_job(job.id)),
            ScrapeJobStatus::Running => {
                warn!(
                    scrape_job_id = %job.id,
                    "Scrape job left RUNNING by an earlier delivery, marking failed"
                );
                self.store
                    .update_status(job.id, ScrapeJobStatus::Failed)
                    .await?;
            }
            ScrapeJobStatus::Completed | ScrapeJobStatus::Failed => {}
        }

        let retry = self.store.create_job(job.retry()).await?;
        info!(
            scrape_job_id = %retry.id,
            retry_of = %root,
            previous_job_id = %job.id,
            previous_status = %job.status,
            "Re-running scrape on a fresh job row"
        );

        Ok(payload.for_job(retry.id))
    }
}

#[async_trait]
impl JobHandler for ScrapeJobHandler {
    fn job_type(&self) -> &'static str {
        SCRAPE_JOB_TYPE
    }

    async fn handle(&self, job: &ClaimedJob) -> Result<(), JobFailure> {
        let payload: ScrapeJobPayload = job
            .deserialize()
            .map_err(|e| JobFailure::permanent(format!("{:#}", e)))?;

        if job.is_redelivery() {
            info!(
                queue_job_id = %job.id,
                attempt = job.attempt,
                scrape_job_id = %payload.scrape_job_id,
                "Redelivered scrape job"
            );
        }

        let result = match self.prepare_delivery(payload).await {
            Ok(payload) => self.processor.process(&payload).await.map(|_| ()),
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            let kind = e.error_kind();
            JobFailure {
                message: format!("{:#}", anyhow::Error::new(e)),
                kind,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{QueueJobId, ScrapeJobId};
    use crate::domains::scraping::{NewScrapeJob, ScrapeJob, ScrapeSettings};
    use crate::kernel::jobs::ErrorKind;
    use crate::kernel::test_dependencies::{InMemoryScrapeJobStore, MockMapsProvider};
    use maps_client::LatLng;

    fn handler(store: Arc<InMemoryScrapeJobStore>, maps: MockMapsProvider) -> ScrapeJobHandler {
        ScrapeJobHandler::new(ScrapeJobProcessor::new(
            store,
            Arc::new(maps),
            ScrapeSettings::default(),
        ))
    }

    fn delivery(args: serde_json::Value, attempt: i32) -> ClaimedJob {
        ClaimedJob {
            id: QueueJobId::new(),
            job_type: SCRAPE_JOB_TYPE.into(),
            args,
            attempt,
            max_attempts: 3,
        }
    }

    async fn pending_job(store: &InMemoryScrapeJobStore) -> ScrapeJob {
        store
            .create_job(
                NewScrapeJob::builder()
                    .keyword("restaurant")
                    .location("Bandung")
                    .radius(1500)
                    .build(),
            )
            .await
            .unwrap()
    }

    fn payload_for(job: &ScrapeJob) -> serde_json::Value {
        serde_json::json!({ "location": job.location, "scrapeJobId": job.id.to_string() })
    }

    fn bandung() -> MockMapsProvider {
        MockMapsProvider::new()
            .with_geocode("Bandung", vec![LatLng::new(-6.91, 107.61)])
            .with_pages(vec![vec!["p1", "p2"]])
    }

    #[tokio::test]
    async fn test_pending_job_processed_in_place() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let job = pending_job(&store).await;

        handler(store.clone(), bandung())
            .handle(&delivery(payload_for(&job), 1))
            .await
            .unwrap();

        assert_eq!(store.jobs().len(), 1);
        assert_eq!(store.job(job.id).unwrap().status, ScrapeJobStatus::Completed);
        assert_eq!(store.places(job.id).len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_permanent() {
        let store = Arc::new(InMemoryScrapeJobStore::new());

        let failure = handler(store, bandung())
            .handle(&delivery(serde_json::json!({ "radius": 5 }), 1))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::NonRetryable);
    }

    #[tokio::test]
    async fn test_location_not_found_is_permanent() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let job = pending_job(&store).await;

        let failure = handler(store.clone(), MockMapsProvider::new())
            .handle(&delivery(payload_for(&job), 1))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::NonRetryable);
        assert!(failure.message.contains("Bandung"));
        assert_eq!(store.job(job.id).unwrap().status, ScrapeJobStatus::Failed);
    }

    #[tokio::test]
    async fn test_transport_failure_is_retryable_with_source() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let job = pending_job(&store).await;

        let failure = handler(store.clone(), MockMapsProvider::new().failing_geocode())
            .handle(&delivery(payload_for(&job), 1))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Retryable);
        // Provider error is carried in the message
        assert!(failure.message.contains("503"));
    }

    #[tokio::test]
    async fn test_redelivery_of_failed_job_uses_fresh_row() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let job = pending_job(&store).await;
        let handler = handler(store.clone(), bandung());

        store.update_status(job.id, ScrapeJobStatus::Running).await.unwrap();
        store.update_status(job.id, ScrapeJobStatus::Failed).await.unwrap();

        handler.handle(&delivery(payload_for(&job), 2)).await.unwrap();

        let original = store.job(job.id).unwrap();
        assert_eq!(original.status, ScrapeJobStatus::Failed);
        assert!(store.places(job.id).is_empty());

        let retry = store
            .jobs()
            .into_iter()
            .find(|j| j.retry_of == Some(job.id))
            .unwrap();
        assert_eq!(retry.status, ScrapeJobStatus::Completed);
        assert_eq!(retry.location, job.location);
        assert_eq!(store.places(retry.id).len(), 2);
    }

    #[tokio::test]
    async fn test_redelivery_of_stuck_running_job_fails_it_first() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let job = pending_job(&store).await;
        store.update_status(job.id, ScrapeJobStatus::Running).await.unwrap();

        handler(store.clone(), bandung())
            .handle(&delivery(payload_for(&job), 2))
            .await
            .unwrap();

        let original = store.job(job.id).unwrap();
        assert_eq!(original.status, ScrapeJobStatus::Failed);
        assert!(original.completed_at.is_some());
        assert_eq!(store.jobs().len(), 2);
    }

    #[tokio::test]
    async fn test_redelivery_fails_crashed_retry_row_before_rerun() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let original = pending_job(&store).await;
        store.update_status(original.id, ScrapeJobStatus::Running).await.unwrap();
        store.update_status(original.id, ScrapeJobStatus::Failed).await.unwrap();

        // Second attempt got as far as RUNNING on its retry row, then the worker died
        let crashed = store.create_job(original.retry()).await.unwrap();
        store.update_status(crashed.id, ScrapeJobStatus::Running).await.unwrap();

        handler(store.clone(), bandung())
            .handle(&delivery(payload_for(&original), 3))
            .await
            .unwrap();

        let crashed = store.job(crashed.id).unwrap();
        assert_eq!(crashed.status, ScrapeJobStatus::Failed);
        assert!(crashed.completed_at.is_some());

        let jobs = store.jobs();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.status != ScrapeJobStatus::Running));

        let rerun = jobs.last().unwrap();
        assert_eq!(rerun.retry_of, Some(original.id));
        assert_eq!(rerun.status, ScrapeJobStatus::Completed);
        assert_eq!(store.places(rerun.id).len(), 2);
    }

    #[tokio::test]
    async fn test_redelivery_runs_pending_retry_row_in_place() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let original = pending_job(&store).await;
        store.update_status(original.id, ScrapeJobStatus::Running).await.unwrap();
        store.update_status(original.id, ScrapeJobStatus::Failed).await.unwrap();
        let waiting = store.create_job(original.retry()).await.unwrap();

        handler(store.clone(), bandung())
            .handle(&delivery(payload_for(&original), 3))
            .await
            .unwrap();

        assert_eq!(store.jobs().len(), 2);
        assert_eq!(store.job(waiting.id).unwrap().status, ScrapeJobStatus::Completed);
        assert_eq!(store.places(waiting.id).len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_job_row_is_permanent() {
        let store = Arc::new(InMemoryScrapeJobStore::new());
        let payload = serde_json::json!({
            "location": "Bandung",
            "scrapeJobId": ScrapeJobId::new().to_string(),
        });

        let failure = handler(store, bandung())
            .handle(&delivery(payload, 1))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::NonRetryable);
        assert!(failure.message.contains("not found"));
    }
}
