use serde::{Deserialize, Serialize};

use super::SortDirection;

pub const DEFAULT_PAGE_SIZE: u64 = 15;

/// Offset based pagination used for template listings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Builds a pagination window from a 1-based page number.
    /// A zero page or page size falls back to the first page / default size.
    pub fn from_page(page: u64, page_size: u64) -> Self {
        let limit = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        let page = page.max(1);

        Self {
            limit,
            offset: (page - 1) * limit,
        }
    }
}

/// Cursor based pagination over the versions of a single template.
/// ---
/// `cursor` is the last version number the caller has already seen.
/// The next page continues strictly after it in `direction`, so versions
/// appended between two page requests never shift entries that were
/// already returned.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionPageRequest {
    pub cursor: Option<u32>,
    pub limit: u64,
    pub direction: SortDirection,
}

impl Default for VersionPageRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_SIZE,
            direction: SortDirection::Ascending,
        }
    }
}

impl VersionPageRequest {
    pub fn new(limit: u64, direction: SortDirection) -> Self {
        Self {
            cursor: None,
            limit,
            direction,
        }
    }

    pub fn after(mut self, cursor: u32) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_PAGE_SIZE as usize
        } else {
            self.limit as usize
        }
    }

    /// Whether `version` lies after the cursor in the requested direction.
    pub fn admits(&self, version: u32) -> bool {
        match (self.cursor, self.direction) {
            (None, _) => true,
            (Some(cursor), SortDirection::Ascending) => version > cursor,
            (Some(cursor), SortDirection::Descending) => version < cursor,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<u32>,
}
