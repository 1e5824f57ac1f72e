//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod jobs;
pub mod test_dependencies;
pub mod traits;

pub use deps::{MapsClientAdapter, ServerDeps};
pub use test_dependencies::{InMemoryJobQueue, InMemoryScrapeJobStore, MockMapsProvider};
pub use traits::*;
