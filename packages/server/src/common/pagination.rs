//! Offset-based pagination for listing endpoints and CLI output.
//!
//! # Usage
//!
//! ```rust,ignore
//! let request = PageRequest::new(Some(2), Some(10));
//! let page = ScrapeJob::list_recent(&request, pool).await?;
//! println!("page {} of {}", page.page, page.last_page);
//! ```

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A validated page request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Missing or non-positive values fall back to page 1 and the default
    /// page size; oversized limits are clamped.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of items plus the totals needed to render a pager.
#[derive(Debug, Clone, Serialize)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub last_page: i64,
}

impl<T> OffsetPage<T> {
    pub fn new(items: Vec<T>, total: i64, request: &PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            last_page: (total + request.limit - 1) / request.limit,
        }
    }
}
