//! `Prefer` header parsing.
//!
//! JSON:API doesn't define the `Prefer` header itself, but the teacher's
//! `return=minimal`/`return=representation` convention is a common,
//! widely-supported extension for letting a client skip the response body
//! on a write it doesn't need echoed back.

use super::types::{PreferRepresentation, Preferences};
use crate::error::{Error, Result};
use http::HeaderMap;

pub fn parse_preferences(headers: &HeaderMap) -> Result<Preferences> {
    let mut preferences = Preferences::default();

    if let Some(prefer) = headers.get("prefer") {
        let value = prefer
            .to_str()
            .map_err(|_| Error::Payload("invalid Prefer header encoding".into()))?;

        for directive in value.split(',').map(str::trim) {
            match directive {
                "return=minimal" => preferences.representation = PreferRepresentation::Minimal,
                "return=representation" => preferences.representation = PreferRepresentation::Full,
                _ => {}
            }
        }
    }

    Ok(preferences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_return_minimal() {
        let mut headers = HeaderMap::new();
        headers.insert("prefer", "return=minimal".parse().unwrap());
        let prefs = parse_preferences(&headers).unwrap();
        assert_eq!(prefs.representation, PreferRepresentation::Minimal);
    }

    #[test]
    fn test_default_representation_is_full() {
        let headers = HeaderMap::new();
        let prefs = parse_preferences(&headers).unwrap();
        assert_eq!(prefs.representation, PreferRepresentation::Full);
    }
}
