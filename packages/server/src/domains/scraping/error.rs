use maps_client::MapsError;
use thiserror::Error;

use super::models::ScrapeJobStatus;
use crate::common::ScrapeJobId;
use crate::kernel::jobs::ErrorKind;

/// Failures of the scrape job / place record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scrape job {0} not found")]
    NotFound(ScrapeJobId),

    #[error("scrape job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ScrapeJobId,
        from: ScrapeJobStatus,
        to: ScrapeJobStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures while processing one scrape job.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("location \"{0}\" not found")]
    LocationNotFound(String),

    #[error("geocoding failed for \"{location}\"")]
    GeoService {
        location: String,
        #[source]
        source: MapsError,
    },

    #[error("nearby search failed on page {page}")]
    Search {
        page: usize,
        #[source]
        source: MapsError,
    },

    #[error("failed to fetch details for place {place_id}")]
    DetailsFetch {
        place_id: String,
        #[source]
        source: MapsError,
    },

    #[error("nearby search still had more results after {limit} pages")]
    PaginationLimitExceeded { limit: usize },

    #[error("invalid scrape request: {0}")]
    InvalidRequest(String),

    #[error("scrape aborted unexpectedly: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScrapeError {
    /// Retry classification handed to the queue.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            ScrapeError::LocationNotFound(_)
            | ScrapeError::PaginationLimitExceeded { .. }
            | ScrapeError::InvalidRequest(_)
            | ScrapeError::Store(StoreError::NotFound(_))
            | ScrapeError::Store(StoreError::InvalidTransition { .. }) => ErrorKind::NonRetryable,
            ScrapeError::GeoService { .. }
            | ScrapeError::Search { .. }
            | ScrapeError::DetailsFetch { .. }
            | ScrapeError::Internal(_)
            | ScrapeError::Store(StoreError::Database(_)) => ErrorKind::Retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_error() -> MapsError {
        MapsError::Api {
            status: 503,
            message: "backend unavailable".into(),
        }
    }

    #[test]
    fn test_user_input_errors_are_not_retried() {
        assert_eq!(
            ScrapeError::LocationNotFound("Nowhereville".into()).error_kind(),
            ErrorKind::NonRetryable
        );
        assert_eq!(
            ScrapeError::PaginationLimitExceeded { limit: 50 }.error_kind(),
            ErrorKind::NonRetryable
        );
    }

    #[test]
    fn test_provider_errors_are_retried() {
        let err = ScrapeError::GeoService {
            location: "Bandung".into(),
            source: transport_error(),
        };
        assert_eq!(err.error_kind(), ErrorKind::Retryable);

        let err = ScrapeError::Search {
            page: 2,
            source: transport_error(),
        };
        assert_eq!(err.error_kind(), ErrorKind::Retryable);
    }

    #[test]
    fn test_caught_panic_is_retried() {
        let err = ScrapeError::Internal("index out of bounds".into());
        assert_eq!(err.error_kind(), ErrorKind::Retryable);
    }

    #[test]
    fn test_invalid_transition_is_permanent() {
        let err = ScrapeError::from(StoreError::InvalidTransition {
            id: ScrapeJobId::new(),
            from: ScrapeJobStatus::Completed,
            to: ScrapeJobStatus::Running,
        });
        assert_eq!(err.error_kind(), ErrorKind::NonRetryable);
        assert!(err.to_string().contains("COMPLETED"));
    }

    #[test]
    fn test_source_chain_is_preserved() {
        use std::error::Error;

        let err = ScrapeError::DetailsFetch {
            place_id: "p1".into(),
            source: transport_error(),
        };
        let source = err.source().unwrap().to_string();
        assert!(source.contains("503"));
    }
}
