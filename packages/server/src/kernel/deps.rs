//! Server dependencies for the scrape worker (using traits for testability)
//!
//! This module provides the dependency container the binaries build once at
//! startup. External services sit behind trait objects so tests can swap in
//! the doubles from `test_dependencies`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use maps_client::{GeocodeResult, MapsClient, NearbySearchPage, NearbySearchRequest, PlaceDetails};
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::domains::scraping::{
    PostgresScrapeJobStore, ScrapeJobHandler, ScrapeJobProcessor, ScrapeJobStore, ScrapeSettings,
};
use crate::kernel::jobs::{JobQueue, PostgresJobQueue};
use crate::kernel::BaseMapsProvider;

// =============================================================================
// MapsClient Adapter (implements BaseMapsProvider trait)
// =============================================================================

/// Wrapper around MapsClient that implements BaseMapsProvider trait
pub struct MapsClientAdapter(pub Arc<MapsClient>);

impl MapsClientAdapter {
    pub fn new(client: Arc<MapsClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseMapsProvider for MapsClientAdapter {
    async fn geocode(&self, address: &str) -> maps_client::Result<Vec<GeocodeResult>> {
        self.0.geocode(address).await
    }

    async fn nearby_search(
        &self,
        request: &NearbySearchRequest,
    ) -> maps_client::Result<NearbySearchPage> {
        self.0.nearby_search(request).await
    }

    async fn place_details(&self, place_id: &str) -> maps_client::Result<PlaceDetails> {
        self.0.place_details(place_id).await
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Everything a scrape needs at runtime
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub maps: Arc<dyn BaseMapsProvider>,
    pub job_queue: Arc<dyn JobQueue>,
    pub scrape_store: Arc<dyn ScrapeJobStore>,
    pub settings: ScrapeSettings,
}

impl ServerDeps {
    pub fn new(
        db_pool: PgPool,
        maps: Arc<dyn BaseMapsProvider>,
        job_queue: Arc<dyn JobQueue>,
        scrape_store: Arc<dyn ScrapeJobStore>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            db_pool,
            maps,
            job_queue,
            scrape_store,
            settings,
        }
    }

    /// Production wiring: Postgres store and queue, HTTP maps client.
    pub fn from_config(config: &Config, db_pool: PgPool) -> Result<Self> {
        let client = MapsClient::with_options(
            config.google_maps_api_key.clone(),
            config.maps_base_url.clone(),
            config.maps_http_timeout,
        )
        .context("Failed to build maps client")?;

        Ok(Self::new(
            db_pool.clone(),
            Arc::new(MapsClientAdapter::new(Arc::new(client))),
            Arc::new(PostgresJobQueue::new(db_pool.clone())),
            Arc::new(PostgresScrapeJobStore::new(db_pool)),
            config.scrape_settings(),
        ))
    }

    pub fn scrape_processor(&self) -> ScrapeJobProcessor {
        ScrapeJobProcessor::new(
            self.scrape_store.clone(),
            self.maps.clone(),
            self.settings.clone(),
        )
    }

    pub fn scrape_handler(&self) -> Arc<ScrapeJobHandler> {
        Arc::new(ScrapeJobHandler::new(self.scrape_processor()))
    }
}
