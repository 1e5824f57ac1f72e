//! Scraping domain: turns a submitted geographic search into place records.
//!
//! ```text
//! submit_scrape ──► ScrapeJob (PENDING) + queue message
//!
//! ScrapeJobHandler ──► ScrapeJobProcessor
//!                         ├─► GeoResolver            (geocode)
//!                         ├─► PlaceSearchPaginator   (nearby search pages)
//!                         │       └─► PlaceDetailsFetcher (per place)
//!                         └─► ScrapeJobStore         (status + place records)
//! ```

pub mod actions;
pub mod error;
pub mod job_handler;
pub mod models;
pub mod processor;
pub mod store;

pub use actions::{
    submit_scrape, FoundPlace, GeoResolver, PlaceDetailsFetcher, PlaceSearchPaginator,
    ScrapeSettings, SearchParams, SubmitScrapeRequest, DEFAULT_CATEGORY, DEFAULT_RADIUS,
    MIN_PAGE_TOKEN_DELAY,
};
pub use error::{ScrapeError, StoreError};
pub use job_handler::{ScrapeJobHandler, SCRAPE_JOB_TYPE};
pub use models::{NewPlaceRecord, NewScrapeJob, PlaceRecord, ScrapeJob, ScrapeJobStatus};
pub use processor::{ScrapeJobPayload, ScrapeJobProcessor, ScrapeOutcome};
pub use store::{PostgresScrapeJobStore, ScrapeJobStore};
