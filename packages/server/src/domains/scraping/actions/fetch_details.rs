use std::sync::Arc;

use maps_client::PlaceDetails;

use crate::domains::scraping::error::ScrapeError;
use crate::kernel::BaseMapsProvider;

/// Fetches the details field set for one place. One outbound call per
/// invocation; this is the dominant cost of a scrape.
#[derive(Clone)]
pub struct PlaceDetailsFetcher {
    maps: Arc<dyn BaseMapsProvider>,
}

impl PlaceDetailsFetcher {
    pub fn new(maps: Arc<dyn BaseMapsProvider>) -> Self {
        Self { maps }
    }

    pub async fn fetch_details(&self, place_id: &str) -> Result<PlaceDetails, ScrapeError> {
        self.maps
            .place_details(place_id)
            .await
            .map_err(|source| ScrapeError::DetailsFetch {
                place_id: place_id.to_string(),
                source,
            })
    }
}
