mod ordering;
mod pagination;
pub mod scalar;

pub use ordering::SortDirection;
pub use pagination::{DEFAULT_PAGE_SIZE, Page, Pagination, VersionPageRequest};
