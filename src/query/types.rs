use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_size: usize,
    pub page_number: usize,
}

impl PageRequest {
    pub fn new(page_size: usize, page_number: usize) -> Self {
        Self {
            page_size,
            page_number,
        }
    }

    pub fn first(page_size: usize) -> Self {
        Self::new(page_size, 1)
    }
}

/// One page of matches plus the size of the full match set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// Comparable projection of a record's sort field.
///
/// Records with the field absent sort before any present value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Missing,
    Rank(u8),
    Text(String),
    Time(DateTime<Utc>),
}

impl SortValue {
    /// Case-insensitive text key.
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_lowercase())
    }

    pub fn optional_text(value: Option<&str>) -> Self {
        value.map_or(Self::Missing, Self::text)
    }

    pub fn optional_time(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Missing, Self::Time)
    }
}
