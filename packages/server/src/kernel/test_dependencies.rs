// Test doubles for the kernel traits and stores
//
// Lets the processor, handler and worker run without Docker or network.
// Every double records what it was asked so tests can assert on calls.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use maps_client::{
    GeocodeResult, Geometry, LatLng, MapsError, NearbySearchPage, NearbySearchRequest,
    PlaceDetails, PlaceSummary,
};

use super::jobs::{
    retry_delay, ClaimedJob, ErrorKind, FailureOutcome, JobQueue, JobStatus, QueueJob,
};
use super::BaseMapsProvider;
use crate::common::{QueueJobId, ScrapeJobId};
use crate::domains::scraping::{
    NewPlaceRecord, NewScrapeJob, PlaceRecord, ScrapeJob, ScrapeJobStatus, ScrapeJobStore,
    StoreError,
};

fn outage(what: &str) -> MapsError {
    MapsError::Api {
        status: 503,
        message: format!("mock {} outage", what),
    }
}

// =============================================================================
// Mock Maps Provider
// =============================================================================

/// One recorded nearby-search call
#[derive(Debug, Clone)]
pub struct SearchCall {
    pub request: NearbySearchRequest,
    /// Tokio clock reading, so paused-clock tests can check page spacing
    pub at: tokio::time::Instant,
}

/// Scriptable maps provider.
///
/// Pages are chained with tokens `page-2`, `page-3`, ...; the last page has
/// no token. Unregistered addresses geocode to zero matches. Details are
/// synthesized from the place id unless overridden.
pub struct MockMapsProvider {
    geocodes: HashMap<String, Vec<LatLng>>,
    geocode_fails: bool,
    pages: Vec<Vec<PlaceSummary>>,
    endless: bool,
    failing_pages: HashSet<usize>,
    details: HashMap<String, PlaceDetails>,
    failing_details: HashSet<String>,
    geocode_calls: Arc<Mutex<Vec<String>>>,
    search_calls: Arc<Mutex<Vec<SearchCall>>>,
    details_calls: Arc<Mutex<Vec<String>>>,
}

impl MockMapsProvider {
    pub fn new() -> Self {
        Self {
            geocodes: HashMap::new(),
            geocode_fails: false,
            pages: Vec::new(),
            endless: false,
            failing_pages: HashSet::new(),
            details: HashMap::new(),
            failing_details: HashSet::new(),
            geocode_calls: Arc::new(Mutex::new(Vec::new())),
            search_calls: Arc::new(Mutex::new(Vec::new())),
            details_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_geocode(mut self, address: &str, matches: Vec<LatLng>) -> Self {
        self.geocodes.insert(address.to_string(), matches);
        self
    }

    /// Every geocode call fails with a 503
    pub fn failing_geocode(mut self) -> Self {
        self.geocode_fails = true;
        self
    }

    /// Search pages by place id, in order
    pub fn with_pages(mut self, pages: Vec<Vec<&str>>) -> Self {
        self.pages = pages
            .into_iter()
            .map(|ids| ids.into_iter().map(summary).collect())
            .collect();
        self
    }

    /// Every page carries a next-page token
    pub fn endless_pages(mut self) -> Self {
        self.endless = true;
        self
    }

    /// The 1-based search page fails with a 503
    pub fn failing_search_page(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn with_details(mut self, place_id: &str, details: PlaceDetails) -> Self {
        self.details.insert(place_id.to_string(), details);
        self
    }

    pub fn failing_details(mut self, place_id: &str) -> Self {
        self.failing_details.insert(place_id.to_string());
        self
    }

    pub fn geocode_calls(&self) -> Vec<String> {
        self.geocode_calls.lock().unwrap().clone()
    }

    pub fn search_calls(&self) -> Vec<SearchCall> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn details_calls(&self) -> Vec<String> {
        self.details_calls.lock().unwrap().clone()
    }

    fn page(&self, number: usize) -> NearbySearchPage {
        if self.endless {
            return NearbySearchPage {
                results: vec![summary(&format!("endless-{}", number))],
                next_page_token: Some(format!("page-{}", number + 1)),
            };
        }

        let results = number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .cloned()
            .unwrap_or_default();
        let next_page_token = (number < self.pages.len()).then(|| format!("page-{}", number + 1));
        NearbySearchPage {
            results,
            next_page_token,
        }
    }
}

impl Default for MockMapsProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn summary(place_id: &str) -> PlaceSummary {
    PlaceSummary {
        place_id: place_id.to_string(),
        name: Some(format!("Place {}", place_id)),
        vicinity: Some(format!("Near {}", place_id)),
        types: vec!["restaurant".to_string(), "food".to_string()],
        rating: Some(4.0),
        user_ratings_total: Some(10),
    }
}

fn default_details(place_id: &str) -> PlaceDetails {
    PlaceDetails {
        place_id: Some(place_id.to_string()),
        name: Some(format!("Place {}", place_id)),
        formatted_address: Some(format!("Jl. {} No. 1", place_id)),
        formatted_phone_number: Some("022 555 0100".to_string()),
        website: Some(format!("https://{}.example.com", place_id)),
        rating: Some(4.5),
        user_ratings_total: Some(42),
        types: vec![
            "restaurant".to_string(),
            "food".to_string(),
            "point_of_interest".to_string(),
        ],
        url: Some(format!("https://maps.google.com/?cid={}", place_id)),
    }
}

#[async_trait]
impl BaseMapsProvider for MockMapsProvider {
    async fn geocode(&self, address: &str) -> maps_client::Result<Vec<GeocodeResult>> {
        self.geocode_calls.lock().unwrap().push(address.to_string());

        if self.geocode_fails {
            return Err(outage("geocode"));
        }

        let matches = self.geocodes.get(address).cloned().unwrap_or_default();
        Ok(matches
            .into_iter()
            .map(|location| GeocodeResult {
                formatted_address: Some(address.to_string()),
                place_id: None,
                geometry: Geometry { location },
            })
            .collect())
    }

    async fn nearby_search(
        &self,
        request: &NearbySearchRequest,
    ) -> maps_client::Result<NearbySearchPage> {
        self.search_calls.lock().unwrap().push(SearchCall {
            request: request.clone(),
            at: tokio::time::Instant::now(),
        });

        let number = match &request.page_token {
            None => 1,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| MapsError::Status {
                    status: "INVALID_REQUEST".to_string(),
                    message: Some(format!("unknown page token {}", token)),
                })?,
        };

        if self.failing_pages.contains(&number) {
            return Err(outage("search"));
        }

        Ok(self.page(number))
    }

    async fn place_details(&self, place_id: &str) -> maps_client::Result<PlaceDetails> {
        self.details_calls.lock().unwrap().push(place_id.to_string());

        if self.failing_details.contains(place_id) {
            return Err(outage("details"));
        }

        Ok(self
            .details
            .get(place_id)
            .cloned()
            .unwrap_or_else(|| default_details(place_id)))
    }
}

// =============================================================================
// In-Memory Scrape Job Store
// =============================================================================

/// Scrape job store backed by vectors. Enforces the same lifecycle rules as
/// the Postgres store through `ScrapeJob::apply_transition`.
pub struct InMemoryScrapeJobStore {
    jobs: Arc<Mutex<Vec<ScrapeJob>>>,
    places: Arc<Mutex<Vec<PlaceRecord>>>,
    transitions: Arc<Mutex<Vec<(ScrapeJobId, ScrapeJobStatus, ScrapeJobStatus)>>>,
    failing_place_names: HashSet<String>,
    failing_statuses: HashSet<ScrapeJobStatus>,
}

impl InMemoryScrapeJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            places: Arc::new(Mutex::new(Vec::new())),
            transitions: Arc::new(Mutex::new(Vec::new())),
            failing_place_names: HashSet::new(),
            failing_statuses: HashSet::new(),
        }
    }

    /// Inserting a place record with this name fails
    pub fn failing_place(mut self, name: &str) -> Self {
        self.failing_place_names.insert(name.to_string());
        self
    }

    /// Status updates to `status` fail with a database error
    pub fn failing_status(mut self, status: ScrapeJobStatus) -> Self {
        self.failing_statuses.insert(status);
        self
    }

    pub fn job(&self, id: ScrapeJobId) -> Option<ScrapeJob> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    pub fn jobs(&self) -> Vec<ScrapeJob> {
        self.jobs.lock().unwrap().clone()
    }

    /// Place records of one job, in insertion order
    pub fn places(&self, job_id: ScrapeJobId) -> Vec<PlaceRecord> {
        self.places
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.scrape_job_id == job_id)
            .cloned()
            .collect()
    }

    /// Every applied status change as `(job, from, to)`
    pub fn transitions(&self) -> Vec<(ScrapeJobId, ScrapeJobStatus, ScrapeJobStatus)> {
        self.transitions.lock().unwrap().clone()
    }
}

impl Default for InMemoryScrapeJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn simulated_db_error(what: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!("simulated failure: {}", what)))
}

#[async_trait]
impl ScrapeJobStore for InMemoryScrapeJobStore {
    async fn create_job(&self, new: NewScrapeJob) -> Result<ScrapeJob, StoreError> {
        let job = new.into_job();
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn find_job(&self, id: ScrapeJobId) -> Result<ScrapeJob, StoreError> {
        self.job(id).ok_or(StoreError::NotFound(id))
    }

    async fn find_latest_attempt(&self, root: ScrapeJobId) -> Result<ScrapeJob, StoreError> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|j| j.id == root || j.retry_of == Some(root))
            .cloned()
            .ok_or(StoreError::NotFound(root))
    }

    async fn attach_queue_job(
        &self,
        id: ScrapeJobId,
        queue_job_id: QueueJobId,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound(id))?;
        job.queue_job_id = Some(queue_job_id);
        Ok(())
    }

    async fn update_status(
        &self,
        id: ScrapeJobId,
        status: ScrapeJobStatus,
    ) -> Result<ScrapeJob, StoreError> {
        if self.failing_statuses.contains(&status) {
            return Err(simulated_db_error(status.as_str()));
        }

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound(id))?;

        let from = job.status;
        job.apply_transition(status, Utc::now())?;
        self.transitions.lock().unwrap().push((id, from, status));
        Ok(job.clone())
    }

    async fn insert_place(&self, place: NewPlaceRecord) -> Result<PlaceRecord, StoreError> {
        if self.failing_place_names.contains(&place.name) {
            return Err(simulated_db_error(&place.name));
        }
        if self.job(place.scrape_job_id).is_none() {
            return Err(simulated_db_error("place_records_scrape_job_id_fkey"));
        }

        let record = place.into_record();
        self.places.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn count_places(&self, id: ScrapeJobId) -> Result<i64, StoreError> {
        Ok(self.places(id).len() as i64)
    }
}

// =============================================================================
// In-Memory Job Queue
// =============================================================================

/// Job queue with the same claim / retry / dead-letter rules as
/// `PostgresJobQueue`, held in memory.
pub struct InMemoryJobQueue {
    jobs: Arc<Mutex<Vec<QueueJob>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn job(&self, id: QueueJobId) -> Option<QueueJob> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    pub fn jobs(&self) -> Vec<QueueJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        args: serde_json::Value,
        max_attempts: i32,
    ) -> Result<QueueJobId> {
        let job = QueueJob::builder()
            .job_type(job_type)
            .args(args)
            .max_attempts(max_attempts.max(1))
            .build();
        let id = job.id;
        self.jobs.lock().unwrap().push(job);
        Ok(id)
    }

    async fn claim(&self, worker_id: &str, limit: i64, lease: Duration) -> Result<Vec<ClaimedJob>> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)?;
        let mut jobs = self.jobs.lock().unwrap();

        for job in jobs.iter_mut() {
            let expired = job.status == JobStatus::Running
                && job.lease_expires_at.is_some_and(|at| at < now);
            if expired && job.attempt >= job.max_attempts {
                job.status = JobStatus::DeadLetter;
                job.error_message
                    .get_or_insert_with(|| "lease expired on final attempt".to_string());
                job.dead_lettered_at = Some(now);
                job.lease_expires_at = None;
            }
        }

        let mut claimed = Vec::new();
        for job in jobs.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }

            let ready = job.status == JobStatus::Pending && job.next_run_at <= now;
            let reclaim = job.status == JobStatus::Running
                && job.lease_expires_at.is_some_and(|at| at < now)
                && job.attempt < job.max_attempts;
            if !ready && !reclaim {
                continue;
            }

            if reclaim {
                job.attempt += 1;
            }
            job.status = JobStatus::Running;
            job.lease_expires_at = Some(now + lease);
            job.worker_id = Some(worker_id.to_string());
            job.updated_at = now;
            claimed.push(ClaimedJob::from(job.clone()));
        }

        Ok(claimed)
    }

    async fn heartbeat(&self, job_id: QueueJobId, lease: Duration) -> Result<()> {
        let lease = chrono::Duration::from_std(lease)?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            job.lease_expires_at = Some(Utc::now() + lease);
        }
        Ok(())
    }

    async fn mark_succeeded(&self, job_id: QueueJobId) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("queue job {} not found", job_id))?;
        job.status = JobStatus::Succeeded;
        job.lease_expires_at = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: QueueJobId,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("queue job {} not found", job_id))?;

        job.error_message = Some(error.to_string());
        job.error_kind = Some(kind);
        job.lease_expires_at = None;
        job.updated_at = Utc::now();

        if job.can_retry(kind) {
            let run_at = Utc::now() + retry_delay(job.attempt);
            job.attempt += 1;
            job.status = JobStatus::Pending;
            job.next_run_at = run_at;
            job.worker_id = None;
            Ok(FailureOutcome::Retrying {
                next_attempt: job.attempt,
                run_at,
            })
        } else {
            job.status = JobStatus::DeadLetter;
            job.dead_lettered_at = Some(Utc::now());
            Ok(FailureOutcome::DeadLettered)
        }
    }
}
