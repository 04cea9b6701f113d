//! Response header building.

use http::{HeaderMap, HeaderValue};

/// Build the header set for a JSON:API response: content type, and
/// `Location` on a successful create.
pub fn build_response_headers(location: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(v) = HeaderValue::from_str("application/vnd.api+json") {
        headers.insert(http::header::CONTENT_TYPE, v);
    }

    if let Some(loc) = location {
        if let Ok(v) = HeaderValue::from_str(loc) {
            headers.insert(http::header::LOCATION, v);
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_response_headers_sets_content_type() {
        let headers = build_response_headers(None);
        assert_eq!(headers.get(http::header::CONTENT_TYPE).unwrap(), "application/vnd.api+json");
    }

    #[test]
    fn test_build_response_headers_sets_location() {
        let headers = build_response_headers(Some("/articles/1"));
        assert_eq!(headers.get(http::header::LOCATION).unwrap(), "/articles/1");
    }
}
