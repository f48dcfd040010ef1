//! Query engine: free-text search, categorical and date-bucket filters,
//! stable sorting and 1-based pagination over in-memory collections.

pub mod calendar;
pub mod collections;
pub mod engine;
pub mod list_state;
pub mod search;
pub mod types;

pub use calendar::{DateWindow, QueryContext};
pub use collections::{todays_alerts, HOME_ALERT_LIMIT};
pub use engine::{query, Queryable};
pub use list_state::ListState;
pub use types::{PageRequest, QueryResult, SortDirection, SortSpec, SortValue};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown sort key for {collection}: {key}")]
    UnknownSortKey { collection: &'static str, key: String },

    #[error("Invalid page request: size {page_size}, page {page_number}")]
    InvalidPage { page_size: usize, page_number: usize },
}
