//! Typed ID definitions for all domain entities.
//!
//! # Example
//!
//! ```rust
//! use scraper_core::common::{PlaceRecordId, ScrapeJobId};
//!
//! let job_id = ScrapeJobId::new();
//! let place_id = PlaceRecordId::new();
//!
//! // This would be a compile error:
//! // let wrong: ScrapeJobId = place_id;
//! ```

// Re-export the core Id type and version markers
pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for ScrapeJob entities (one submitted search).
pub struct ScrapeJob;

/// Marker type for PlaceRecord entities (one discovered place).
pub struct PlaceRecord;

/// Marker type for queue jobs (rows in the `jobs` table).
pub struct QueueJob;

/// Marker type for users who submit scrapes.
pub struct User;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for ScrapeJob entities.
pub type ScrapeJobId = Id<ScrapeJob>;

/// Typed ID for PlaceRecord entities.
pub type PlaceRecordId = Id<PlaceRecord>;

/// Typed ID for queue jobs.
pub type QueueJobId = Id<QueueJob>;

/// Typed ID for users.
pub type UserId = Id<User>;
