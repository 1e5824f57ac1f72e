pub mod entity_ids;
pub mod id;
pub mod pagination;

pub use entity_ids::*;
pub use pagination::{OffsetPage, PageRequest};
