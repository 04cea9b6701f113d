//! Error taxonomy for the JSON:API core.
//!
//! Every variant maps to exactly one JSON:API `errors[]` status and title,
//! via [`Error::to_jsonapi_errors`].

use http::StatusCode;
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error taxonomy. Each variant corresponds to one taxonomy entry.
#[derive(Error, Debug)]
pub enum Error {
    /// Type/range/enum/required violation. May carry more than one entry;
    /// collected across an entire validation pass before reporting.
    #[error("validation failed")]
    Validation(Vec<ValidationFailure>),

    /// Malformed JSON or JSON:API envelope.
    #[error("malformed payload: {0}")]
    Payload(String),

    /// Resource, relationship, or route missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation or optimistic-concurrency mismatch.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Permission hook denied the request.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Bad content-type on a write.
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// Malformed or incompatible pagination cursor.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// `include` depth exceeded, or an unknown relationship was named.
    #[error("invalid include: {0}")]
    InvalidInclude(String),

    /// Install-time resource descriptor error. Fatal; raised by the schema
    /// compiler, never by request handling.
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    /// Database/storage-adapter failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Connection pool exhaustion or acquisition failure.
    #[error("connection pool error: {0}")]
    ConnectionPool(String),

    /// Request exceeded its configured timeout.
    #[error("timeout")]
    Timeout,

    /// Uncaught failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A single field-level validation failure.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// JSON pointer into the request body, e.g. `/data/attributes/title`.
    pub pointer: String,
    /// Human-readable detail, e.g. "title is required".
    pub detail: String,
}

impl ValidationFailure {
    pub fn new(field: &str, detail: impl Into<String>) -> Self {
        Self {
            pointer: format!("/data/attributes/{field}"),
            detail: detail.into(),
        }
    }

    pub fn relationship(name: &str, detail: impl Into<String>) -> Self {
        Self {
            pointer: format!("/data/relationships/{name}"),
            detail: detail.into(),
        }
    }
}

impl Error {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Payload(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            Self::InvalidInclude(_) => StatusCode::BAD_REQUEST,
            Self::SchemaInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(db_err) => db_err.status_code(),
            Self::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short taxonomy name, used only for logging/metrics, never on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Payload(_) => "payload",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::UnsupportedMedia(_) => "unsupported_media",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::InvalidInclude(_) => "invalid_include",
            Self::SchemaInvalid(_) => "schema_invalid",
            Self::Database(_) | Self::ConnectionPool(_) => "internal",
            Self::Timeout => "internal",
            Self::Internal(_) => "internal",
        }
    }

    /// Render this error as one or more JSON:API error objects. Only
    /// `Validation` ever produces more than one entry.
    pub fn to_jsonapi_errors(&self) -> Vec<JsonApiError> {
        let status = self.status_code().as_str().to_string();

        match self {
            Self::Validation(failures) => failures
                .iter()
                .map(|f| JsonApiError {
                    status: status.clone(),
                    title: "Validation Error".to_string(),
                    detail: f.detail.clone(),
                    source: Some(JsonApiErrorSource {
                        pointer: f.pointer.clone(),
                    }),
                })
                .collect(),
            other => vec![JsonApiError {
                status,
                title: title_for(other),
                detail: other.to_string(),
                source: None,
            }],
        }
    }
}

fn title_for(error: &Error) -> String {
    match error {
        Error::Payload(_) => "Malformed Payload",
        Error::NotFound(_) => "Not Found",
        Error::Conflict(_) => "Conflict",
        Error::Forbidden(_) => "Forbidden",
        Error::Unauthorized(_) => "Unauthorized",
        Error::UnsupportedMedia(_) => "Unsupported Media Type",
        Error::InvalidCursor(_) => "Invalid Cursor",
        Error::InvalidInclude(_) => "Invalid Include",
        Error::SchemaInvalid(_) => "Schema Invalid",
        Error::Database(_) | Error::ConnectionPool(_) => "Internal Server Error",
        Error::Timeout => "Request Timeout",
        Error::Internal(_) => "Internal Server Error",
        Error::Validation(_) => "Validation Error",
    }
    .to_string()
}

/// A single JSON:API error object: `{status, title, detail, source}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonApiError {
    pub status: String,
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<JsonApiErrorSource>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonApiErrorSource {
    pub pointer: String,
}

/// Database-specific error, kept close to the teacher's shape since this
/// is dialect knowledge (PostgreSQL SQLSTATE classes), not protocol
/// knowledge.
#[derive(Error, Debug)]
#[error("database error [{code}]: {message}")]
pub struct DatabaseError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub hint: Option<String>,
    pub constraint: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
}

impl DatabaseError {
    /// Map PostgreSQL SQLSTATE class to JSON:API taxonomy/HTTP status.
    pub fn status_code(&self) -> StatusCode {
        match self.code.as_str() {
            c if c.starts_with("23") => StatusCode::CONFLICT,
            c if c.starts_with("42") => StatusCode::BAD_REQUEST,
            c if c.starts_with("28") => StatusCode::FORBIDDEN,
            c if c.starts_with("40") => StatusCode::CONFLICT,
            c if c.starts_with("53") => StatusCode::SERVICE_UNAVAILABLE,
            c if c.starts_with("54") => StatusCode::PAYLOAD_TOO_LARGE,
            "P0001" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::NotFound("books/9".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Error::Forbidden("nope".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::UnsupportedMedia("text/html".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn test_validation_produces_one_entry_per_failure() {
        let error = Error::Validation(vec![
            ValidationFailure::new("title", "title is required"),
            ValidationFailure::new("price", "price must be positive"),
        ]);
        let errors = error.to_jsonapi_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].status, "422");
        assert_eq!(errors[0].source.as_ref().unwrap().pointer, "/data/attributes/title");
    }

    #[test]
    fn test_non_validation_produces_single_entry() {
        let error = Error::NotFound("books/9".into());
        let errors = error.to_jsonapi_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status, "404");
    }

    #[test]
    fn test_database_error_status() {
        let constraint_error = DatabaseError {
            code: "23505".into(),
            message: "duplicate key".into(),
            details: None,
            hint: None,
            constraint: Some("books_pkey".into()),
            table: Some("books".into()),
            column: None,
        };
        assert_eq!(constraint_error.status_code(), StatusCode::CONFLICT);
    }
}
