//! Pure Google Maps REST API client.
//!
//! A minimal client for the three endpoints a place scrape needs: geocoding a
//! free-text address, paginated nearby search, and place details.
//!
//! # Example
//!
//! ```rust,ignore
//! use maps_client::{MapsClient, NearbySearchRequest};
//!
//! let client = MapsClient::new("your-api-key".into())?;
//!
//! let matches = client.geocode("Jakarta Selatan").await?;
//! let page = client
//!     .nearby_search(&NearbySearchRequest {
//!         location: matches[0].geometry.location,
//!         radius: 1500,
//!         keyword: "restaurant".into(),
//!         page_token: None,
//!     })
//!     .await?;
//! for place in &page.results {
//!     println!("{}", place.name.as_deref().unwrap_or("(unnamed)"));
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{MapsError, Result};
pub use types::{
    GeocodeResult, Geometry, LatLng, NearbySearchPage, NearbySearchRequest, PlaceDetails,
    PlaceSummary,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use types::{GeocodeResponse, NearbySearchResponse, PlaceDetailsResponse};

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Fields requested from the Place Details API. Billing is per field group,
/// so this list stays explicit.
pub const DETAILS_FIELDS: &str = "place_id,name,formatted_address,formatted_phone_number,website,rating,user_ratings_total,types,url";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub struct MapsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl MapsClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_options(api_key, DEFAULT_BASE_URL.to_string(), DEFAULT_TIMEOUT)
    }

    /// Build a client against a custom base URL (proxies, recorded fixtures)
    /// with a per-request timeout.
    pub fn with_options(api_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Geocode a free-text address. Returns matches in provider order; an
    /// unknown address yields an empty list rather than an error.
    pub async fn geocode(&self, address: &str) -> Result<Vec<GeocodeResult>> {
        let resp: GeocodeResponse = self
            .get_json("geocode/json", &[("address", address.to_string())])
            .await?;
        check_status(&resp.status, resp.error_message)?;

        tracing::debug!(address, matches = resp.results.len(), "Geocoded address");
        Ok(resp.results)
    }

    /// Fetch one page of nearby-search results.
    pub async fn nearby_search(&self, request: &NearbySearchRequest) -> Result<NearbySearchPage> {
        let resp: NearbySearchResponse = self
            .get_json("place/nearbysearch/json", &nearby_query(request))
            .await?;
        check_status(&resp.status, resp.error_message)?;

        Ok(NearbySearchPage {
            results: resp.results,
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Fetch the details field set for a single place.
    pub async fn place_details(&self, place_id: &str) -> Result<PlaceDetails> {
        let resp: PlaceDetailsResponse = self
            .get_json(
                "place/details/json",
                &[
                    ("place_id", place_id.to_string()),
                    ("fields", DETAILS_FIELDS.to_string()),
                ],
            )
            .await?;
        check_status(&resp.status, resp.error_message)?;

        resp.result
            .ok_or_else(|| MapsError::MissingResult(place_id.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MapsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }
}

fn nearby_query(request: &NearbySearchRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("location", request.location.to_query_value()),
        ("radius", request.radius.to_string()),
        ("keyword", request.keyword.clone()),
    ];
    if let Some(token) = &request.page_token {
        query.push(("pagetoken", token.clone()));
    }
    query
}

/// `OK` and `ZERO_RESULTS` are successful answers; everything else is a
/// provider-side failure.
fn check_status(status: &str, message: Option<String>) -> Result<()> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => Err(MapsError::Status {
            status: other.to_string(),
            message,
        }),
    }
}
