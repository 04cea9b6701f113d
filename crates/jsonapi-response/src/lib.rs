//! JSON:API document assembly and HTTP response framing.
//!
//! [`document`] builds the `{data, included, links, meta}` / `{errors}`
//! envelopes; this module wraps the serialized bytes in the
//! status/headers/body triple the transport layer writes back.

pub mod document;
mod headers;
mod links;

pub use document::{
    CursorMeta, DocumentLinks, DocumentMeta, EagerLinkage, ErrorDocument, JsonApiDocument, Linkage, PaginationMeta,
    PrimaryData, RelationshipLinks, RelationshipObject, ResourceDocument, ResourceIdentifier, SelfLink,
};
pub use headers::build_response_headers;
pub use links::{self_link, with_page_params};

use http::{HeaderMap, StatusCode};
use thiserror::Error;

/// A formatted HTTP response ready for the transport layer to write out.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<bytes::Bytes>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, bytes::Bytes::new())
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Frame a success document as a `200`/`201` response.
pub fn format_document(status: StatusCode, document: &JsonApiDocument, location: Option<&str>) -> Result<Response, FormatError> {
    let body = serde_json::to_vec(document)?;
    let mut response = Response::new(status, body);
    response.headers = build_response_headers(location);
    Ok(response)
}

/// Frame an error as an `{errors: [...]}` response. The status written on
/// the HTTP envelope is the first error's status, matching the JSON:API
/// convention that a single logical failure drives the response code even
/// when multiple validation failures are reported in the body.
pub fn format_error(error: &jsonapi_core::error::Error) -> Result<Response, FormatError> {
    let document = ErrorDocument::from(error);
    let body = serde_json::to_vec(&document)?;
    let mut response = Response::new(error.status_code(), body);
    response.headers = build_response_headers(None);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_uses_error_status() {
        let error = jsonapi_core::error::Error::NotFound("articles/1".into());
        let response = format_error(&error).unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["errors"][0]["status"], "404");
    }

    #[test]
    fn test_format_document_empty_collection() {
        let document = JsonApiDocument::new(PrimaryData::Many(vec![]), vec![], DocumentLinks::default(), DocumentMeta::default());
        let response = format_document(StatusCode::OK, &document, None).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["data"], serde_json::json!([]));
        assert!(parsed.get("included").is_none());
    }
}
