// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (pagination, merging, status handling) lives in the domain
// and uses these traits.
//
// Naming convention: Base* for trait names (e.g., BaseMapsProvider)

use async_trait::async_trait;
use maps_client::{GeocodeResult, NearbySearchPage, NearbySearchRequest, PlaceDetails};

// =============================================================================
// Maps Trait (Infrastructure - geocoding and place search)
// =============================================================================

/// The three provider calls a scrape makes. Errors stay typed so the domain
/// can keep the provider failure as its error source.
#[async_trait]
pub trait BaseMapsProvider: Send + Sync {
    /// Geocode free text; an unknown address is an empty list, not an error
    async fn geocode(&self, address: &str) -> maps_client::Result<Vec<GeocodeResult>>;

    /// One page of nearby-search results plus the next-page token, if any
    async fn nearby_search(
        &self,
        request: &NearbySearchRequest,
    ) -> maps_client::Result<NearbySearchPage>;

    async fn place_details(&self, place_id: &str) -> maps_client::Result<PlaceDetails>;
}
