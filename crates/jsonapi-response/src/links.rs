//! Pagination link construction.
//!
//! Generated links must keep every non-`page` query parameter from the
//! original request intact, bracket notation included — so these helpers
//! rewrite only the `page[...]` keys of the original raw query string
//! rather than re-serializing `QueryParams` from scratch.

/// Rebuild `base_path?query` with every `page[...]` key replaced by
/// `replacement` (empty means "drop pagination entirely", used for `self`
/// on a non-paginated fetch).
pub fn with_page_params(base_path: &str, raw_query: &str, replacement: &[(&str, String)]) -> String {
    let mut kept: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.as_bytes())
        .filter(|(k, _)| !k.starts_with("page["))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    for (key, value) in replacement {
        kept.push((key.to_string(), value.clone()));
    }

    if kept.is_empty() {
        return base_path.to_string();
    }

    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();
    format!("{base_path}?{query}")
}

/// `self` link for the primary request, unchanged query string.
pub fn self_link(base_path: &str, raw_query: &str) -> String {
    if raw_query.is_empty() {
        base_path.to_string()
    } else {
        format!("{base_path}?{raw_query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_page_params_preserves_other_keys() {
        let link = with_page_params("/articles", "include=author&fields%5Barticles%5D=title", &[("page[number]", "2".into())]);
        assert!(link.contains("include=author"));
        assert!(link.contains("page%5Bnumber%5D=2") || link.contains("page[number]=2"));
    }

    #[test]
    fn test_with_page_params_replaces_existing_page_key() {
        let link = with_page_params("/articles", "page%5Bnumber%5D=1", &[("page[number]", "3".into())]);
        assert_eq!(link.matches("page").count(), 1);
    }

    #[test]
    fn test_self_link_no_query() {
        assert_eq!(self_link("/articles/1", ""), "/articles/1");
    }
}
