//! Persistence seam for scrape jobs and their place records.
//!
//! The processor only talks to [`ScrapeJobStore`]; production uses
//! [`PostgresScrapeJobStore`], tests use the in-memory store from
//! `kernel::test_dependencies`.

use async_trait::async_trait;
use sqlx::PgPool;

use super::error::StoreError;
use super::models::{NewPlaceRecord, NewScrapeJob, PlaceRecord, ScrapeJob, ScrapeJobStatus};
use crate::common::{QueueJobId, ScrapeJobId};

#[async_trait]
pub trait ScrapeJobStore: Send + Sync {
    /// Insert a new PENDING job.
    async fn create_job(&self, new: NewScrapeJob) -> Result<ScrapeJob, StoreError>;

    async fn find_job(&self, id: ScrapeJobId) -> Result<ScrapeJob, StoreError>;

    /// Newest row of the retry chain rooted at `root`.
    async fn find_latest_attempt(&self, root: ScrapeJobId) -> Result<ScrapeJob, StoreError>;

    async fn attach_queue_job(
        &self,
        id: ScrapeJobId,
        queue_job_id: QueueJobId,
    ) -> Result<(), StoreError>;

    /// Atomically move a job forward. Terminal statuses also stamp
    /// `completed_at`. Fails with `InvalidTransition` for any move the
    /// lifecycle does not allow, including any change to a terminal job.
    async fn update_status(
        &self,
        id: ScrapeJobId,
        status: ScrapeJobStatus,
    ) -> Result<ScrapeJob, StoreError>;

    async fn insert_place(&self, place: NewPlaceRecord) -> Result<PlaceRecord, StoreError>;

    async fn count_places(&self, id: ScrapeJobId) -> Result<i64, StoreError>;
}

#[derive(Clone)]
pub struct PostgresScrapeJobStore {
    pool: PgPool,
}

impl PostgresScrapeJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScrapeJobStore for PostgresScrapeJobStore {
    async fn create_job(&self, new: NewScrapeJob) -> Result<ScrapeJob, StoreError> {
        ScrapeJob::insert(new, &self.pool).await
    }

    async fn find_job(&self, id: ScrapeJobId) -> Result<ScrapeJob, StoreError> {
        ScrapeJob::find_by_id(id, &self.pool).await
    }

    async fn find_latest_attempt(&self, root: ScrapeJobId) -> Result<ScrapeJob, StoreError> {
        ScrapeJob::find_latest_attempt(root, &self.pool).await
    }

    async fn attach_queue_job(
        &self,
        id: ScrapeJobId,
        queue_job_id: QueueJobId,
    ) -> Result<(), StoreError> {
        ScrapeJob::attach_queue_job(id, queue_job_id, &self.pool).await
    }

    async fn update_status(
        &self,
        id: ScrapeJobId,
        status: ScrapeJobStatus,
    ) -> Result<ScrapeJob, StoreError> {
        ScrapeJob::transition(id, status, &self.pool).await
    }

    async fn insert_place(&self, place: NewPlaceRecord) -> Result<PlaceRecord, StoreError> {
        PlaceRecord::insert(place, &self.pool).await
    }

    async fn count_places(&self, id: ScrapeJobId) -> Result<i64, StoreError> {
        PlaceRecord::count_by_job(id, &self.pool).await
    }
}
