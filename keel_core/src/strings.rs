//! String predicates used by attribute-name validation and enum parsing.

/// Returns whether `s` is empty or consists solely of whitespace.
pub fn is_empty_or_whitespace(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

/// Returns `s` with every whitespace character removed.
pub fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Lowercased, whitespace-stripped form used for case-insensitive parsing.
pub fn fold_for_parse(s: &str) -> String {
    strip_whitespace(s).to_ascii_lowercase()
}
