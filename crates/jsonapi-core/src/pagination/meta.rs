use serde::Serialize;

/// The `meta` object synthesized for a paginated collection response.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    pub has_more: bool,
}

impl PageMeta {
    pub fn offset(total: Option<i64>, limit: i64, offset: i64, returned: usize) -> Self {
        let page_count = total.map(|t| (t + limit - 1).max(0) / limit.max(1));
        let has_more = match total {
            Some(t) => offset + returned as i64 < t,
            None => returned as i64 == limit,
        };
        Self { total, page_count, has_more }
    }

    pub fn cursor(has_more: bool) -> Self {
        Self { total: None, page_count: None, has_more }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_meta_has_more() {
        let meta = PageMeta::offset(Some(100), 25, 0, 25);
        assert!(meta.has_more);
        assert_eq!(meta.page_count, Some(4));
    }

    #[test]
    fn test_offset_meta_last_page() {
        let meta = PageMeta::offset(Some(30), 25, 25, 5);
        assert!(!meta.has_more);
    }
}
