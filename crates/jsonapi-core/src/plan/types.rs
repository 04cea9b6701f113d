//! Shared planning types.
//!
//! JSON:API's filter grammar is a flat, ANDed list of `filter[...]` terms —
//! there's no boolean-tree combinator syntax the way PostgREST's
//! `and()`/`or()` nesting works, so these types stay flat rather than
//! carrying the teacher's `CoercibleLogicTree` recursive structure.

use crate::request::{FilterOperator, FilterValue, SortDirection};
use serde::{Deserialize, Serialize};

/// A filter term resolved against the schema: `path` has been walked to a
/// concrete join alias and `column` is the real underlying column name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedFilter {
    /// Table alias this filter applies to ("" for the root table).
    pub alias: String,
    pub column: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

/// A sort term resolved against the schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedSort {
    pub alias: String,
    pub column: String,
    pub direction: SortDirection,
}

/// A single column to project, with its output name in the result set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectColumn {
    pub alias: String,
    pub column: String,
    pub output_name: String,
    /// Set for computed fields — the raw SQL expression to project instead
    /// of a plain column reference.
    pub expression: Option<String>,
    /// Set for a synthetic `belongsTo` foreign-key projection the planner
    /// adds so the serializer can build `data.relationships.<rel>.data`
    /// linkage without a round trip through `include`. Never surfaced under
    /// `data.attributes`.
    pub is_relationship_key: bool,
}

/// A join needed to satisfy a cross-relationship filter or sort, derived by
/// walking the schema's precomputed one-hop `join_index`s chain by chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlannedJoin {
    pub alias: String,
    pub table: crate::request::QualifiedIdentifier,
    pub on_left_column: String,
    pub on_right_column: String,
    /// Alias of the table this hop's `on_left_column` lives on. `None` means
    /// the query's root table — only the first hop of any path joins
    /// directly against it; later hops join against the previous hop's
    /// alias.
    pub left_alias: Option<String>,
    /// Set when the relationship walked for this hop is to-many, meaning
    /// the join can multiply root rows and the query needs `DISTINCT`.
    pub one_to_many: bool,
}

/// Resolved pagination strategy for a collection read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PaginationPlan {
    Offset { limit: i64, offset: i64, with_count: bool },
    Cursor { limit: i64, after: Option<crate::pagination::Cursor>, before: Option<crate::pagination::Cursor> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_filter_roundtrips_through_serde() {
        let filter = ResolvedFilter {
            alias: "".into(),
            column: "title".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("Hello".into()),
        };
        let json = serde_json::to_string(&filter).unwrap();
        let back: ResolvedFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back.column, "title");
    }
}
