use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapsError>;

#[derive(Debug, Error)]
pub enum MapsError {
    /// Transport failure, including request timeouts.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Maps API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider answered 200 but reported a non-OK status in the body
    /// (`REQUEST_DENIED`, `OVER_QUERY_LIMIT`, `INVALID_REQUEST`, ...).
    #[error("Maps API returned status {status}: {}", message.as_deref().unwrap_or("no message"))]
    Status {
        status: String,
        message: Option<String>,
    },

    #[error("place details response for {0} contained no result")]
    MissingResult(String),
}
