use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

/// One `(sort column, value)` pair carried in a cursor. A cursor holds one
/// axis per active sort term plus a trailing axis on the primary key so
/// ties between equal sort values still resolve to a stable ordering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CursorAxis {
    pub column: String,
    pub value: String,
}

/// An opaque pagination cursor: the sort-key values of the last row seen,
/// used to build a `WHERE (a, b) > (x, y)`-style resume predicate instead
/// of an `OFFSET` scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub axes: Vec<CursorAxis>,
    /// True when resuming forward (`page[after]`), false when paging
    /// backward (`page[before]`).
    pub forward: bool,
}

impl Cursor {
    pub fn new(axes: Vec<CursorAxis>, forward: bool) -> Self {
        Self { axes, forward }
    }

    /// Encode as the opaque string that goes in `page[after]`/`page[before]`.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("Cursor always serializes");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a `page[after]`/`page[before]` value back into a [`Cursor`].
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| Error::InvalidCursor(raw.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|_| Error::InvalidCursor(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_roundtrip() {
        let cursor = Cursor::new(
            vec![
                CursorAxis { column: "created_at".into(), value: "2024-01-01T00:00:00Z".into() },
                CursorAxis { column: "id".into(), value: "42".into() },
            ],
            true,
        );
        let encoded = cursor.encode();
        let decoded = Cursor::decode(&encoded).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_invalid_cursor_rejected() {
        assert!(Cursor::decode("not-a-valid-cursor!!").is_err());
    }
}
