use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use maps_client::{LatLng, NearbySearchRequest, PlaceDetails, PlaceSummary};
use tracing::{debug, warn};

use super::fetch_details::PlaceDetailsFetcher;
use crate::domains::scraping::error::ScrapeError;
use crate::kernel::BaseMapsProvider;

/// Radius used when a job gives none (or zero).
pub const DEFAULT_RADIUS: u32 = 1500;

/// Keyword used when a job gives no category.
pub const DEFAULT_CATEGORY: &str = "restaurant";

/// A next-page token only becomes valid some time after it is issued;
/// requesting sooner yields an empty or INVALID_REQUEST page.
pub const MIN_PAGE_TOKEN_DELAY: Duration = Duration::from_secs(2);

/// Tuning for the paginated search.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    /// Wait between pages; never below [`MIN_PAGE_TOKEN_DELAY`]
    pub page_token_delay: Duration,
    /// Pages fetched before giving up with `PaginationLimitExceeded`
    pub max_pages: usize,
    /// Detail fetches in flight within one page
    pub details_concurrency: usize,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            page_token_delay: MIN_PAGE_TOKEN_DELAY,
            max_pages: 50,
            details_concurrency: 1,
        }
    }
}

/// One search request with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub location: LatLng,
    pub radius: u32,
    pub category: String,
}

impl SearchParams {
    pub fn new(location: LatLng, radius: Option<u32>, category: Option<&str>) -> Self {
        Self {
            location,
            radius: radius.filter(|r| *r > 0).unwrap_or(DEFAULT_RADIUS),
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
        }
    }
}

/// A search result merged with its details.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundPlace {
    pub summary: PlaceSummary,
    pub details: PlaceDetails,
}

/// Drives the nearby-search page-token protocol from page one until the
/// provider stops returning tokens, fetching details for every result.
///
/// A place whose details cannot be fetched is logged and skipped; the
/// pagination carries on. Pages are strictly sequential. Within a page,
/// details may be fetched concurrently but results keep page order.
#[derive(Clone)]
pub struct PlaceSearchPaginator {
    maps: Arc<dyn BaseMapsProvider>,
    details: PlaceDetailsFetcher,
    settings: ScrapeSettings,
}

impl PlaceSearchPaginator {
    pub fn new(maps: Arc<dyn BaseMapsProvider>, settings: ScrapeSettings) -> Self {
        Self {
            details: PlaceDetailsFetcher::new(maps.clone()),
            maps,
            settings,
        }
    }

    pub fn settings(&self) -> &ScrapeSettings {
        &self.settings
    }

    pub async fn search_all(&self, params: &SearchParams) -> Result<Vec<FoundPlace>, ScrapeError> {
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page = 0usize;

        loop {
            page += 1;
            let request = NearbySearchRequest {
                location: params.location,
                radius: params.radius,
                keyword: params.category.clone(),
                page_token: page_token.take(),
            };

            let result = self
                .maps
                .nearby_search(&request)
                .await
                .map_err(|source| ScrapeError::Search { page, source })?;

            debug!(
                page,
                results = result.results.len(),
                has_next = result.next_page_token.is_some(),
                "Fetched search page"
            );

            let details = self.fetch_page_details(&result.results).await;
            for (summary, details) in result.results.into_iter().zip(details) {
                match details {
                    Ok(details) => found.push(FoundPlace { summary, details }),
                    Err(e) => {
                        warn!(
                            place_id = %summary.place_id,
                            page,
                            error = %e,
                            "Skipping place whose details could not be fetched"
                        );
                    }
                }
            }

            let Some(token) = result.next_page_token else {
                break;
            };

            if page >= self.settings.max_pages {
                return Err(ScrapeError::PaginationLimitExceeded {
                    limit: self.settings.max_pages,
                });
            }

            tokio::time::sleep(self.settings.page_token_delay.max(MIN_PAGE_TOKEN_DELAY)).await;
            page_token = Some(token);
        }

        Ok(found)
    }

    /// Details for every summary, in page order.
    async fn fetch_page_details(
        &self,
        summaries: &[PlaceSummary],
    ) -> Vec<Result<PlaceDetails, ScrapeError>> {
        let place_ids: Vec<String> = summaries.iter().map(|s| s.place_id.clone()).collect();
        stream::iter(place_ids)
            .map(|place_id| {
                let fetcher = self.details.clone();
                async move { fetcher.fetch_details(&place_id).await }
            })
            .buffered(self.settings.details_concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockMapsProvider;

    fn paginator(maps: MockMapsProvider, max_pages: usize) -> PlaceSearchPaginator {
        PlaceSearchPaginator::new(
            Arc::new(maps),
            ScrapeSettings {
                max_pages,
                ..ScrapeSettings::default()
            },
        )
    }

    fn params() -> SearchParams {
        SearchParams::new(LatLng::new(-6.91, 107.61), None, None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_allowed_page_without_token_succeeds() {
        let maps = MockMapsProvider::new().with_pages(vec![vec!["a"], vec!["b"], vec!["c"]]);

        let found = paginator(maps, 3).search_all(&params()).await.unwrap();

        let ids: Vec<&str> = found.iter().map(|f| f.summary.place_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_after_last_allowed_page_is_limit_error() {
        let maps = MockMapsProvider::new().with_pages(vec![vec!["a"], vec!["b"], vec!["c"]]);

        let err = paginator(maps, 2).search_all(&params()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::PaginationLimitExceeded { limit: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_failure_names_page() {
        let maps = MockMapsProvider::new()
            .with_pages(vec![vec!["a"], vec!["b"]])
            .failing_search_page(2);

        let err = paginator(maps, 50).search_all(&params()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Search { page: 2, .. }));
    }

    #[tokio::test]
    async fn test_details_merged_with_summary() {
        let maps = MockMapsProvider::new().with_pages(vec![vec!["a"]]);

        let found = paginator(maps, 50).search_all(&params()).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].details.place_id.as_deref(), Some("a"));
        assert_eq!(found[0].summary.place_id, "a");
    }

    #[tokio::test]
    async fn test_concurrent_details_keep_page_order() {
        let maps = MockMapsProvider::new()
            .with_pages(vec![vec!["a", "b", "c", "d"]])
            .failing_details("b");
        let paginator = PlaceSearchPaginator::new(
            Arc::new(maps),
            ScrapeSettings {
                details_concurrency: 3,
                ..ScrapeSettings::default()
            },
        );

        let found = paginator.search_all(&params()).await.unwrap();

        let ids: Vec<&str> = found.iter().map(|f| f.summary.place_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_search_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let paginator = paginator(MockMapsProvider::new(), 50);
        let params = params();
        assert_send(&paginator.search_all(&params));
    }

    #[test]
    fn test_search_params_defaults() {
        let at = LatLng::new(-6.2, 106.8);

        let params = SearchParams::new(at, None, None);
        assert_eq!(params.radius, 1500);
        assert_eq!(params.category, "restaurant");

        let params = SearchParams::new(at, Some(0), Some("  "));
        assert_eq!(params.radius, 1500);
        assert_eq!(params.category, "restaurant");

        let params = SearchParams::new(at, Some(3000), Some("cafe"));
        assert_eq!(params.radius, 3000);
        assert_eq!(params.category, "cafe");
    }

    #[test]
    fn test_default_settings() {
        let settings = ScrapeSettings::default();
        assert_eq!(settings.page_token_delay, Duration::from_secs(2));
        assert_eq!(settings.max_pages, 50);
        assert_eq!(settings.details_concurrency, 1);
    }
}
