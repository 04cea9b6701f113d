//! HTTP request parsing into the domain-specific [`ApiRequest`] type.
//!
//! This is the only place in the crate that ever looks at a raw query
//! string or header map — everything downstream (schema compiler, planner,
//! executor, serializer) only ever sees parsed types.

pub mod payload;
pub mod preferences;
pub mod query_params;
pub mod types;

pub use payload::{parse_payload, validate_payload_type};
pub use preferences::parse_preferences;
pub use query_params::parse_query_params;
pub use types::*;

use crate::error::{Error, Result};
use http::{Method, Request};
use indexmap::IndexMap;

/// Parse an HTTP request into an [`ApiRequest`]. The body, if any, must be
/// parsed separately with [`parse_payload`] once it has been fully read.
pub fn parse_request<B>(req: &Request<B>) -> Result<ApiRequest> {
    let method = req.method();
    let path = req.uri().path();
    let query = req.uri().query().unwrap_or("");

    let action = parse_action(method, path)?;
    let query_params = parse_query_params(query)?;
    let preferences = parse_preferences(req.headers())?;
    let headers = extract_headers(req.headers());

    Ok(ApiRequest {
        action,
        payload: None,
        query_params,
        preferences,
        method: method.to_string(),
        path: path.to_string(),
        headers,
    })
}

/// Parse the action from HTTP method and URL path.
///
/// Route table:
/// - `/{type}`                              GET, POST
/// - `/{type}/{id}`                         GET, PATCH, PUT, DELETE
/// - `/{type}/{id}/{rel}`                   GET
/// - `/{type}/{id}/relationships/{rel}`     GET, POST, PATCH, DELETE
fn parse_action(method: &Method, path: &str) -> Result<Action> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [type_name] => match *method {
            Method::GET => Ok(Action::FetchCollection {
                type_name: type_name.to_string(),
            }),
            Method::POST => Ok(Action::CreateResource {
                type_name: type_name.to_string(),
            }),
            _ => Err(Error::Payload(format!("unsupported method {method} on /{type_name}"))),
        },
        [type_name, id] => match *method {
            Method::GET => Ok(Action::FetchResource {
                type_name: type_name.to_string(),
                id: id.to_string(),
            }),
            Method::PATCH => Ok(Action::UpdateResource {
                type_name: type_name.to_string(),
                id: id.to_string(),
            }),
            Method::PUT => Ok(Action::UpsertResource {
                type_name: type_name.to_string(),
                id: id.to_string(),
            }),
            Method::DELETE => Ok(Action::DeleteResource {
                type_name: type_name.to_string(),
                id: id.to_string(),
            }),
            _ => Err(Error::Payload(format!("unsupported method {method} on /{type_name}/{id}"))),
        },
        [type_name, id, "relationships", rel] => match *method {
            Method::GET => Ok(Action::FetchRelationship {
                type_name: type_name.to_string(),
                id: id.to_string(),
                relationship: rel.to_string(),
            }),
            Method::POST => Ok(Action::AddToRelationship {
                type_name: type_name.to_string(),
                id: id.to_string(),
                relationship: rel.to_string(),
            }),
            Method::PATCH => Ok(Action::ReplaceRelationship {
                type_name: type_name.to_string(),
                id: id.to_string(),
                relationship: rel.to_string(),
            }),
            Method::DELETE => Ok(Action::RemoveFromRelationship {
                type_name: type_name.to_string(),
                id: id.to_string(),
                relationship: rel.to_string(),
            }),
            _ => Err(Error::Payload(format!(
                "unsupported method {method} on /{type_name}/{id}/relationships/{rel}"
            ))),
        },
        [type_name, id, rel] => match *method {
            Method::GET => Ok(Action::FetchRelated {
                type_name: type_name.to_string(),
                id: id.to_string(),
                relationship: rel.to_string(),
            }),
            _ => Err(Error::Payload(format!("unsupported method {method} on /{type_name}/{id}/{rel}"))),
        },
        _ => Err(Error::NotFound(format!("no route matches '{path}'"))),
    }
}

fn extract_headers(headers: &http::HeaderMap) -> IndexMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect()
}

/// Validate `Content-Type`/`Accept` against `application/vnd.api+json` per
/// the JSON:API media-type negotiation rules. A request body is only
/// checked if `has_body` is true. When `strict` is false (config's
/// `strict_content_type = false`), this is a no-op — useful for clients
/// that don't bother setting the header correctly.
pub fn validate_media_type(headers: &http::HeaderMap, has_body: bool, strict: bool) -> Result<()> {
    if !strict {
        return Ok(());
    }

    if has_body {
        if let Some(ct) = headers.get(http::header::CONTENT_TYPE) {
            let ct_str = ct.to_str().map_err(|_| Error::UnsupportedMedia("invalid Content-Type encoding".into()))?;
            let base = ct_str.split(';').next().unwrap_or("").trim();
            if base != JSONAPI_MEDIA_TYPE {
                return Err(Error::UnsupportedMedia(format!(
                    "Content-Type must be '{JSONAPI_MEDIA_TYPE}', got '{base}'"
                )));
            }
        } else {
            return Err(Error::UnsupportedMedia("missing Content-Type header".into()));
        }
    }

    if let Some(accept) = headers.get(http::header::ACCEPT) {
        let accept_str = accept.to_str().map_err(|_| Error::UnsupportedMedia("invalid Accept encoding".into()))?;
        let acceptable = accept_str.split(',').any(|part| {
            let base = part.split(';').next().unwrap_or("").trim();
            base == JSONAPI_MEDIA_TYPE || base == "*/*" || base == "application/*"
        });
        if !acceptable {
            return Err(Error::UnsupportedMedia(format!(
                "Accept header does not include '{JSONAPI_MEDIA_TYPE}'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection_route() {
        assert_eq!(
            parse_action(&Method::GET, "/articles").unwrap(),
            Action::FetchCollection { type_name: "articles".into() }
        );
    }

    #[test]
    fn test_parse_resource_route() {
        assert_eq!(
            parse_action(&Method::PATCH, "/articles/1").unwrap(),
            Action::UpdateResource { type_name: "articles".into(), id: "1".into() }
        );
    }

    #[test]
    fn test_parse_related_route() {
        assert_eq!(
            parse_action(&Method::GET, "/articles/1/author").unwrap(),
            Action::FetchRelated {
                type_name: "articles".into(),
                id: "1".into(),
                relationship: "author".into(),
            }
        );
    }

    #[test]
    fn test_parse_relationship_route() {
        assert_eq!(
            parse_action(&Method::POST, "/articles/1/relationships/tags").unwrap(),
            Action::AddToRelationship {
                type_name: "articles".into(),
                id: "1".into(),
                relationship: "tags".into(),
            }
        );
    }

    #[test]
    fn test_unsupported_method_on_collection() {
        assert!(parse_action(&Method::DELETE, "/articles").is_err());
    }

    #[test]
    fn test_validate_media_type_rejects_wrong_content_type() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(validate_media_type(&headers, true, true).is_err());
    }

    #[test]
    fn test_validate_media_type_accepts_jsonapi() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, JSONAPI_MEDIA_TYPE.parse().unwrap());
        assert!(validate_media_type(&headers, true, true).is_ok());
    }

    #[test]
    fn test_validate_media_type_skipped_when_not_strict() {
        let headers = http::HeaderMap::new();
        assert!(validate_media_type(&headers, true, false).is_ok());
    }
}
