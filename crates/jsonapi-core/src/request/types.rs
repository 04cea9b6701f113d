//! Core types for API request parsing.
//!
//! These types represent the parsed structure of an HTTP request before
//! it's turned into a [`crate::plan::ReadPlan`] or [`crate::plan::MutatePlan`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Identifiers
// ============================================================================

/// A fully qualified identifier with schema and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedIdentifier {
    pub schema: String,
    pub name: String,
}

impl QualifiedIdentifier {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            schema: String::new(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for QualifiedIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.schema, self.name)
        }
    }
}

// ============================================================================
// Resource identity
// ============================================================================

/// A `{type, id}` resource identifier as it appears in linkage and in URLs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
}

// ============================================================================
// Actions
// ============================================================================

/// The action derived from HTTP method + path, generalizing the teacher's
/// `DbAction` to the JSON:API endpoint table (primary resource, related
/// resource, and relationship-linkage endpoints).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// `GET /{type}` - paginated collection
    FetchCollection { type_name: String },
    /// `GET /{type}/{id}` - single resource
    FetchResource { type_name: String, id: String },
    /// `GET /{type}/{id}/{rel}` - the related resource(s), fully serialized
    FetchRelated {
        type_name: String,
        id: String,
        relationship: String,
    },
    /// `GET /{type}/{id}/relationships/{rel}` - resource linkage only
    FetchRelationship {
        type_name: String,
        id: String,
        relationship: String,
    },
    /// `POST /{type}`
    CreateResource { type_name: String },
    /// `PATCH /{type}/{id}`
    UpdateResource { type_name: String, id: String },
    /// `PUT /{type}/{id}` - upsert
    UpsertResource { type_name: String, id: String },
    /// `DELETE /{type}/{id}`
    DeleteResource { type_name: String, id: String },
    /// `POST /{type}/{id}/relationships/{rel}` - append to a to-many relationship
    AddToRelationship {
        type_name: String,
        id: String,
        relationship: String,
    },
    /// `PATCH /{type}/{id}/relationships/{rel}` - replace linkage wholesale
    ReplaceRelationship {
        type_name: String,
        id: String,
        relationship: String,
    },
    /// `DELETE /{type}/{id}/relationships/{rel}` - remove named members
    RemoveFromRelationship {
        type_name: String,
        id: String,
        relationship: String,
    },
}

// ============================================================================
// Filters
// ============================================================================

/// A comparison operator usable in `filter[field][op]=value`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    Between,
}

impl FilterOperator {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "like" => Self::Like,
            "in" => Self::In,
            "between" => Self::Between,
            _ => return None,
        })
    }
}

/// The value(s) a filter operator compares against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Scalar(String),
    List(Vec<String>),
}

/// A single `filter[...]` term. `path` is empty for a filter against the
/// primary resource and non-empty (e.g. `["author"]`) for a filter against a
/// field reached through a relationship (`filter[author.name]=eq.Jane`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterTerm {
    pub path: Vec<String>,
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

// ============================================================================
// Sorting
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A single `sort` term, e.g. `-created-at` or `author.name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortTerm {
    pub path: Vec<String>,
    pub field: String,
    pub direction: SortDirection,
}

// ============================================================================
// Pagination
// ============================================================================

/// Parsed `page[...]` parameters. Offset and cursor mode are mutually
/// exclusive; which one is in effect is decided by the read planner from
/// whichever fields are present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageParams {
    pub number: Option<i64>,
    pub size: Option<i64>,
    pub after: Option<String>,
    pub before: Option<String>,
}

// ============================================================================
// Includes and sparse fieldsets
// ============================================================================

/// A dotted `include` path, e.g. `author.publisher` is `["author", "publisher"]`.
pub type IncludePath = Vec<String>;

// ============================================================================
// Payload (request body)
// ============================================================================

/// A single JSON:API resource object as it appears under `data` (or an
/// element of `data` for a to-many relationship PATCH body).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub relationships: IndexMap<String, RelationshipObject>,
}

/// The `relationships.<name>` member of a resource object: linkage data,
/// either to-one (`Option<ResourceIdentifier>`) or to-many (`Vec<...>`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipObject {
    ToOne { data: Option<ResourceIdentifier> },
    ToMany { data: Vec<ResourceIdentifier> },
}

/// A parsed JSON:API request document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// `{"data": {...}}`
    Single(ResourceObject),
    /// `{"data": [...]}` - used for relationship linkage replace/add/remove bodies
    Linkage(Vec<ResourceIdentifier>),
    /// `{"data": null}` - used to clear a to-one relationship
    Null,
}

// ============================================================================
// Content negotiation
// ============================================================================

pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    JsonApi,
    Other(String),
}

impl Default for MediaType {
    fn default() -> Self {
        Self::JsonApi
    }
}

// ============================================================================
// Preferences (return=minimal|representation extension, Prefer header)
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreferRepresentation {
    #[default]
    Full,
    Minimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub representation: PreferRepresentation,
}

// ============================================================================
// Query parameters
// ============================================================================

/// Parsed query-string parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Canonical query string (sorted keys) — used as a cache key.
    pub canonical: String,
    pub include: Vec<IncludePath>,
    /// Sparse fieldsets per resource type: `fields[articles]=title,body`.
    pub fields: HashMap<String, Vec<String>>,
    pub filters: Vec<FilterTerm>,
    pub sort: Vec<SortTerm>,
    pub page: PageParams,
}

// ============================================================================
// Main ApiRequest
// ============================================================================

/// A fully parsed API request, ready for planning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub action: Action,
    pub payload: Option<Payload>,
    pub query_params: QueryParams,
    pub preferences: Preferences,
    pub method: String,
    pub path: String,
    /// Request headers, lower-cased, for GUC passthrough to pre-request hooks.
    pub headers: IndexMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_identifier() {
        let qi = QualifiedIdentifier::new("public", "articles");
        assert_eq!(qi.to_string(), "public.articles");

        let unqual = QualifiedIdentifier::unqualified("articles");
        assert_eq!(unqual.to_string(), "articles");
    }

    #[test]
    fn test_filter_operator_from_token() {
        assert_eq!(FilterOperator::from_token("eq"), Some(FilterOperator::Eq));
        assert_eq!(FilterOperator::from_token("between"), Some(FilterOperator::Between));
        assert_eq!(FilterOperator::from_token("bogus"), None);
    }
}
