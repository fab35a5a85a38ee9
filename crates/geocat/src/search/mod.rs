//! Catalog search with cursor pagination.

mod cursor;
mod paginated;
mod request;

pub use cursor::Link;
pub(crate) use cursor::{extract_cursor, next_href};
pub use paginated::{DEFAULT_PAGE_SIZE, PaginatedSearch, ResultStream};
pub use request::SearchRequest;
