use serde::{Deserialize, Serialize};

/// A latitude/longitude pair as returned by the Geocoding API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// `lat,lng` as expected by the `location` query parameter.
    pub fn to_query_value(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

/// A single geocoding match.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: Option<String>,
    pub place_id: Option<String>,
    pub geometry: Geometry,
}

/// Parameters for one nearby-search request.
///
/// When `page_token` is set the provider ignores the other parameters, but they
/// are still sent so a request is always self-describing in logs.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbySearchRequest {
    pub location: LatLng,
    pub radius: u32,
    pub keyword: String,
    pub page_token: Option<String>,
}

/// Lightweight place summary from a nearby-search page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaceSummary {
    pub place_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vicinity: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<i64>,
}

/// One page of nearby-search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NearbySearchPage {
    pub results: Vec<PlaceSummary>,
    pub next_page_token: Option<String>,
}

/// Enriched attributes for one place from the Place Details API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaceDetails {
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub formatted_phone_number: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<i64>,
    #[serde(default)]
    pub types: Vec<String>,
    /// Canonical Google Maps URL for the place.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NearbySearchResponse {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub results: Vec<PlaceSummary>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaceDetailsResponse {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub result: Option<PlaceDetails>,
}
