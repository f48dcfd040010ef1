//! Per-view list state: search text, filter, sort and current page.

use crate::config::ListSettings;

use super::calendar::QueryContext;
use super::engine::{query, Queryable};
use super::types::{PageRequest, QueryResult, SortSpec};
use super::QueryError;

/// What a list screen remembers between renders.
///
/// Changing the search text or the filter returns to page 1. Changing the
/// sort keeps the current page.
#[derive(Debug, Clone)]
pub struct ListState<T: Queryable> {
    search_text: String,
    filter: T::Filter,
    sort: SortSpec,
    page_size: usize,
    page: usize,
}

impl<T> ListState<T>
where
    T: Queryable,
    T::Filter: Default + PartialEq,
{
    pub fn new(page_size: usize) -> Self {
        Self {
            search_text: String::new(),
            filter: T::Filter::default(),
            sort: T::default_sort(),
            page_size,
            page: 1,
        }
    }

    pub fn from_settings(settings: &ListSettings) -> Self {
        Self::new(settings.page_size)
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn filter(&self) -> &T::Filter {
        &self.filter
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.search_text {
            self.search_text = text;
            self.page = 1;
        }
    }

    pub fn set_filter(&mut self, filter: T::Filter) {
        if filter != self.filter {
            self.filter = filter;
            self.page = 1;
        }
    }

    pub fn clear_filters(&mut self) {
        self.set_filter(T::Filter::default());
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.sort = sort;
    }

    /// Advance one page unless already on the last one.
    pub fn next_page(&mut self, total_pages: usize) {
        if self.page < total_pages {
            self.page += 1;
        }
    }

    pub fn previous_page(&mut self) {
        if self.page > 1 {
            self.page -= 1;
        }
    }

    /// Jump to `page`, clamped to at least 1.
    pub fn go_to(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn run(&self, records: &[T], ctx: &QueryContext) -> Result<QueryResult<T>, QueryError> {
        query(
            records,
            &self.search_text,
            &self.filter,
            &self.sort,
            PageRequest::new(self.page_size, self.page),
            ctx,
        )
    }
}
