/// Lowercased whitespace-separated terms. An empty or blank query yields none.
pub fn search_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

/// Every term is a substring of `haystack` (AND semantics).
/// Both sides are expected to be lowercased already.
pub fn matches_all(haystack: &str, terms: &[String]) -> bool {
    terms.iter().all(|term| haystack.contains(term.as_str()))
}
