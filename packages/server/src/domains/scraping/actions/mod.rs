mod fetch_details;
mod resolve_location;
mod search_places;
mod submit_scrape;

pub use fetch_details::PlaceDetailsFetcher;
pub use resolve_location::GeoResolver;
pub use search_places::{
    FoundPlace, PlaceSearchPaginator, ScrapeSettings, SearchParams, DEFAULT_CATEGORY,
    DEFAULT_RADIUS, MIN_PAGE_TOKEN_DELAY,
};
pub use submit_scrape::{submit_scrape, SubmitScrapeRequest};
