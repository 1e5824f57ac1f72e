pub mod place_record;
pub mod scrape_job;

pub use place_record::{NewPlaceRecord, PlaceRecord, MISSING_VALUE};
pub use scrape_job::{NewScrapeJob, ScrapeJob, ScrapeJobStatus};
