//! Runs one scrape job end to end.
//!
//! ```text
//! PENDING ──► RUNNING ──► geocode ──► paginate + details ──► persist ──► COMPLETED
//!                │                                                   │
//!                └──────────────── any error or panic ───────────────┴──► FAILED
//! ```
//!
//! RUNNING is written before the first provider call. Every exit path after
//! that attempts a terminal status, so under normal termination a job never
//! stays RUNNING. Place records are written one by one; a record that fails
//! to persist is logged and skipped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::actions::{GeoResolver, PlaceSearchPaginator, ScrapeSettings, SearchParams};
use super::error::ScrapeError;
use super::models::{NewPlaceRecord, ScrapeJobStatus};
use super::store::ScrapeJobStore;
use crate::common::ScrapeJobId;
use crate::kernel::BaseMapsProvider;

/// Queue message for a scrape job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJobPayload {
    pub location: String,
    #[serde(default)]
    pub radius: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
    pub scrape_job_id: ScrapeJobId,
}

impl ScrapeJobPayload {
    /// Same search, recorded against another job row.
    pub fn for_job(&self, scrape_job_id: ScrapeJobId) -> Self {
        Self {
            scrape_job_id,
            ..self.clone()
        }
    }
}

/// Counts reported by a finished scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeOutcome {
    /// Places returned by the search with details attached
    pub found: usize,
    pub persisted: usize,
    /// Places whose record could not be written
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ScrapeJobProcessor {
    store: Arc<dyn ScrapeJobStore>,
    geo: GeoResolver,
    paginator: PlaceSearchPaginator,
}

impl ScrapeJobProcessor {
    pub fn new(
        store: Arc<dyn ScrapeJobStore>,
        maps: Arc<dyn BaseMapsProvider>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            store,
            geo: GeoResolver::new(maps.clone()),
            paginator: PlaceSearchPaginator::new(maps, settings),
        }
    }

    pub fn store(&self) -> &Arc<dyn ScrapeJobStore> {
        &self.store
    }

    /// Process one job. The job must be PENDING. On error the job is left
    /// FAILED (best effort) and the error is returned for the queue to
    /// classify.
    #[instrument(skip_all, fields(scrape_job_id = %payload.scrape_job_id))]
    pub async fn process(&self, payload: &ScrapeJobPayload) -> Result<ScrapeOutcome, ScrapeError> {
        let id = payload.scrape_job_id;

        self.store
            .update_status(id, ScrapeJobStatus::Running)
            .await?;
        info!(location = %payload.location, "Scrape job started");

        let result = AssertUnwindSafe(self.scrape(payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ScrapeError::Internal(panic_message(panic.as_ref()))));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, kind = ?e.error_kind(), "Scrape job failed");
                self.mark_failed(id).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .store
            .update_status(id, ScrapeJobStatus::Completed)
            .await
        {
            error!(error = %e, "Failed to mark scrape job completed");
            self.mark_failed(id).await;
            return Err(e.into());
        }

        info!(
            found = outcome.found,
            persisted = outcome.persisted,
            skipped = outcome.skipped,
            "Scrape job completed"
        );
        Ok(outcome)
    }

    async fn scrape(&self, payload: &ScrapeJobPayload) -> Result<ScrapeOutcome, ScrapeError> {
        let coords = self.geo.resolve(&payload.location).await?;
        let params = SearchParams::new(coords, payload.radius, payload.category.as_deref());

        let places = self.paginator.search_all(&params).await?;

        let mut outcome = ScrapeOutcome {
            found: places.len(),
            ..Default::default()
        };
        for place in &places {
            let record = NewPlaceRecord::from_found(payload.scrape_job_id, place);
            match self.store.insert_place(record).await {
                Ok(_) => outcome.persisted += 1,
                Err(e) => {
                    warn!(
                        place_id = %place.summary.place_id,
                        error = %e,
                        "Failed to persist place record, skipping"
                    );
                    outcome.skipped += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn mark_failed(&self, id: ScrapeJobId) {
        if let Err(e) = self.store.update_status(id, ScrapeJobStatus::Failed).await {
            error!(scrape_job_id = %id, error = %e, "Failed to mark scrape job failed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
