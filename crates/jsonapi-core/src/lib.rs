//! jsonapi-core — the server-side framework core for a JSON:API v1.1
//! compliant REST API over a SQL database.
//!
//! # Architecture
//!
//! The request processing pipeline:
//!
//! 1. **Request parsing** (`request`) - HTTP method/path/query/headers into domain types
//! 2. **Schema** (`schema`) - declarative resource descriptors, compiled once at install time
//! 3. **Query planning** (`plan`) - request + compiled schema into an execution plan
//! 4. **SQL generation** (`query`) - parameterized SQL from a plan
//! 5. **Relationships** (`relationships`) - eager-load includes, write linkage
//! 6. **Pagination** (`pagination`) - offset and opaque-cursor paging
//!
//! # Example
//!
//! ```ignore
//! use jsonapi_core::{parse_request, SchemaRegistry, create_action_plan};
//!
//! let request = parse_request(&http_request)?;
//! let schema = registry.current().await?;
//! let plan = create_action_plan(&request, &schema, &config)?;
//! ```

pub mod config;
pub mod error;
pub mod pagination;
pub mod plan;
mod predicate;
pub mod query;
pub mod relationships;
pub mod request;
pub mod schema;

pub use config::{AppConfig, LogLevel};
pub use error::{Error, Result};
pub use pagination::{Cursor, CursorAxis, PageMeta};
pub use plan::{create_action_plan, ActionPlan, MutatePlan, ReadPlan, RelationshipFetchPlan, RelationshipOp, RelationshipWrite};
pub use request::{
    parse_payload, parse_preferences, parse_query_params, parse_request, validate_payload_type, Action, ApiRequest,
    FilterOperator, FilterTerm, FilterValue, MediaType, Payload, PreferRepresentation, Preferences, QualifiedIdentifier,
    QueryParams, RelationshipObject, ResourceIdentifier, ResourceObject, SortDirection, SortTerm, JSONAPI_MEDIA_TYPE,
};
pub use schema::{
    CompiledResource, CompiledSchema, ComputedField, FieldDescriptor, FieldType, Hidden, JoinChain, JoinHop,
    RelationshipDescriptor, RelationshipKind, ResourceDescriptor, SchemaRegistry, SearchDescriptor,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::config::AppConfig;
    pub use super::error::{Error, Result};
    pub use super::plan::{create_action_plan, ActionPlan};
    pub use super::request::{parse_request, Action, ApiRequest, QualifiedIdentifier, QueryParams};
    pub use super::schema::{CompiledSchema, ResourceDescriptor, SchemaRegistry};
}
