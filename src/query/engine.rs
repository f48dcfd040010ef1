use super::calendar::QueryContext;
use super::search::{matches_all, search_terms};
use super::types::{PageRequest, QueryResult, SortDirection, SortSpec, SortValue};
use super::QueryError;

/// A record collection the list views can search, filter, sort and page.
///
/// Each collection supplies only its field mapping: which fields are
/// searchable (and in which order they are joined), how its filter applies,
/// and which sort keys exist.
pub trait Queryable: Clone {
    type Filter;

    /// Collection name used in error messages.
    const COLLECTION: &'static str;

    /// Accepted sort keys.
    const SORT_KEYS: &'static [&'static str];

    fn default_sort() -> SortSpec;

    /// Searchable fields joined with single spaces, in a fixed order.
    /// Free-text terms may match anywhere in this string.
    fn searchable_text(&self) -> String;

    fn matches_filter(&self, filter: &Self::Filter, ctx: &QueryContext) -> bool;

    /// Projection for `key`. Only called with keys from [`Self::SORT_KEYS`].
    fn sort_value(&self, key: &str) -> SortValue;
}

/// Search, filter, sort and paginate `records`.
///
/// Pure: the same inputs always give the same page. Sorting is stable, so
/// ties keep their fetch order. A page past the end is empty, not an error.
pub fn query<T: Queryable>(
    records: &[T],
    search_text: &str,
    filter: &T::Filter,
    sort: &SortSpec,
    page: PageRequest,
    ctx: &QueryContext,
) -> Result<QueryResult<T>, QueryError> {
    if !T::SORT_KEYS.contains(&sort.key.as_str()) {
        return Err(QueryError::UnknownSortKey {
            collection: T::COLLECTION,
            key: sort.key.clone(),
        });
    }
    if page.page_size == 0 || page.page_number == 0 {
        return Err(QueryError::InvalidPage {
            page_size: page.page_size,
            page_number: page.page_number,
        });
    }

    let terms = search_terms(search_text);
    let mut matched: Vec<(SortValue, &T)> = records
        .iter()
        .filter(|r| terms.is_empty() || matches_all(&r.searchable_text().to_lowercase(), &terms))
        .filter(|r| r.matches_filter(filter, ctx))
        .map(|r| (r.sort_value(&sort.key), r))
        .collect();

    // slice::sort_by is stable; reversing the comparator keeps ties in order.
    matched.sort_by(|(a, _), (b, _)| match sort.direction {
        SortDirection::Ascending => a.cmp(b),
        SortDirection::Descending => b.cmp(a),
    });

    let total_count = matched.len();
    let start = (page.page_number - 1).saturating_mul(page.page_size);
    let items = matched
        .into_iter()
        .skip(start)
        .take(page.page_size)
        .map(|(_, record)| record.clone())
        .collect();

    Ok(QueryResult {
        items,
        total_count,
        page: page.page_number,
        total_pages: total_count.div_ceil(page.page_size),
    })
}
