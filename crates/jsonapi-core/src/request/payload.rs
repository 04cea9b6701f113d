//! Request body parsing: the JSON:API document envelope.

use super::types::*;
use crate::error::{Error, Result};
use bytes::Bytes;

/// Parse a JSON:API request body into a [`Payload`].
pub fn parse_payload(body: Bytes) -> Result<Option<Payload>> {
    if body.is_empty() {
        return Ok(None);
    }

    let document: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| Error::Payload(e.to_string()))?;

    let data = document
        .get("data")
        .ok_or_else(|| Error::Payload("document must have a top-level 'data' member".into()))?;

    match data {
        serde_json::Value::Null => Ok(Some(Payload::Null)),
        serde_json::Value::Object(_) => {
            let resource: ResourceObject =
                serde_json::from_value(data.clone()).map_err(|e| Error::Payload(e.to_string()))?;
            Ok(Some(Payload::Single(resource)))
        }
        serde_json::Value::Array(_) => {
            let identifiers: Vec<ResourceIdentifier> =
                serde_json::from_value(data.clone()).map_err(|e| Error::Payload(e.to_string()))?;
            Ok(Some(Payload::Linkage(identifiers)))
        }
        _ => Err(Error::Payload("'data' must be an object, array, or null".into())),
    }
}

/// Check that a resource object's `type` matches the URL's resource type.
pub fn validate_payload_type(payload: &Payload, expected_type: &str) -> Result<()> {
    match payload {
        Payload::Single(resource) if resource.type_name != expected_type => {
            Err(Error::Conflict(format!(
                "payload type '{}' does not match endpoint type '{expected_type}'",
                resource.type_name
            )))
        }
        Payload::Linkage(identifiers) => {
            if let Some(bad) = identifiers.iter().find(|i| i.type_name != expected_type) {
                return Err(Error::Conflict(format!(
                    "linkage type '{}' does not match relationship target type '{expected_type}'",
                    bad.type_name
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_resource() {
        let body = Bytes::from(
            r#"{"data":{"type":"articles","attributes":{"title":"Hello"}}}"#,
        );
        let payload = parse_payload(body).unwrap().unwrap();
        match payload {
            Payload::Single(resource) => {
                assert_eq!(resource.type_name, "articles");
                assert_eq!(resource.attributes.get("title").unwrap(), "Hello");
            }
            _ => panic!("expected Single"),
        }
    }

    #[test]
    fn test_parse_linkage_array() {
        let body = Bytes::from(r#"{"data":[{"type":"tags","id":"1"},{"type":"tags","id":"2"}]}"#);
        let payload = parse_payload(body).unwrap().unwrap();
        match payload {
            Payload::Linkage(ids) => assert_eq!(ids.len(), 2),
            _ => panic!("expected Linkage"),
        }
    }

    #[test]
    fn test_parse_null_data() {
        let body = Bytes::from(r#"{"data":null}"#);
        let payload = parse_payload(body).unwrap().unwrap();
        assert!(matches!(payload, Payload::Null));
    }

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_payload(Bytes::new()).unwrap().is_none());
    }

    #[test]
    fn test_validate_payload_type_mismatch() {
        let body = Bytes::from(r#"{"data":{"type":"people","attributes":{}}}"#);
        let payload = parse_payload(body).unwrap().unwrap();
        assert!(validate_payload_type(&payload, "articles").is_err());
    }
}
