use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Zero-based page index and page size after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub size: u64,
}

impl PageRequest {
    /// Out-of-range input is clamped, never rejected: a negative page becomes 0
    /// and the size is forced into `1..=MAX_PAGE_SIZE`. The page is also capped
    /// so that `page * size` always fits in an `i64` row offset.
    pub fn clamped(page: i64, size: i64) -> Self {
        let size = size.clamp(1, MAX_PAGE_SIZE);
        Self {
            page: page.clamp(0, i64::MAX / size) as u64,
            size: size as u64,
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }

    /// True when the requested slice starts at or after the last row.
    pub fn is_past_end(&self, total_elements: u64) -> bool {
        self.offset() >= total_elements
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::clamped(0, DEFAULT_PAGE_SIZE)
    }
}

/// One slice of a result set plus what a client needs to draw pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u64,
    pub number: u64,
    pub size: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, total_elements: u64, request: PageRequest) -> Self {
        Self {
            content,
            total_elements,
            total_pages: total_elements.div_ceil(request.size),
            number: request.page,
            size: request.size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            number: self.number,
            size: self.size,
        }
    }
}
