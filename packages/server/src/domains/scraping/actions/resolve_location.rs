use std::sync::Arc;

use maps_client::LatLng;
use tracing::{debug, instrument, warn};

use crate::domains::scraping::error::ScrapeError;
use crate::kernel::BaseMapsProvider;

/// Resolves free-text locations to coordinates with one geocoding call.
///
/// No retries here: a failed lookup fails the job and the queue decides
/// whether the whole job runs again.
#[derive(Clone)]
pub struct GeoResolver {
    maps: Arc<dyn BaseMapsProvider>,
}

impl GeoResolver {
    pub fn new(maps: Arc<dyn BaseMapsProvider>) -> Self {
        Self { maps }
    }

    /// Coordinates of the provider's first match for `location`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, location: &str) -> Result<LatLng, ScrapeError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ScrapeError::InvalidRequest(
                "location must not be empty".to_string(),
            ));
        }

        let matches = self
            .maps
            .geocode(location)
            .await
            .map_err(|source| ScrapeError::GeoService {
                location: location.to_string(),
                source,
            })?;

        let Some(first) = matches.first() else {
            warn!(location, "Location not found by geocoding API");
            return Err(ScrapeError::LocationNotFound(location.to_string()));
        };

        let coords = first.geometry.location;
        debug!(location, lat = coords.lat, lng = coords.lng, "Resolved location");
        Ok(coords)
    }
}
