//! Read (SELECT) query planning: resolving a fetch [`Action`] plus its
//! query-string parameters against a [`CompiledResource`] into a plan the
//! SQL builder can turn into a parameterized query.

use super::types::{PaginationPlan, PlannedJoin, ResolvedFilter, ResolvedSort, SelectColumn};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::pagination::Cursor;
use crate::request::{FilterTerm, IncludePath, QueryParams, SortTerm};
use crate::schema::{CompiledResource, CompiledSchema};

/// A fully resolved plan for one resource fetch, either the primary
/// resource of a request or one hop of an `include`.
#[derive(Clone, Debug)]
pub struct ReadPlan {
    pub type_name: String,
    pub table: crate::request::QualifiedIdentifier,
    pub pk_columns: Vec<String>,
    pub select: Vec<SelectColumn>,
    pub joins: Vec<PlannedJoin>,
    pub filters: Vec<ResolvedFilter>,
    /// Predicates that don't fit `ResolvedFilter`'s flat column/operator/value
    /// shape — `searchSchema` `oneOf`/`applyFilter` expansions and
    /// `filter[search]`'s OR-across-columns full-text predicate. ANDed into
    /// the query alongside `filters`.
    pub raw_filters: Vec<jsonapi_sql::Expr>,
    pub sort: Vec<ResolvedSort>,
    pub pagination: Option<PaginationPlan>,
    /// Set when a joined hop is to-many, so the query builder emits
    /// `SELECT DISTINCT` to keep a one-to-many cross-table filter or sort
    /// from duplicating root rows.
    pub distinct: bool,
}

impl ReadPlan {
    /// Build the plan for the primary resource of a `FetchCollection` or
    /// `FetchResource` action.
    pub fn for_primary(
        type_name: &str,
        schema: &CompiledSchema,
        query_params: &QueryParams,
        config: &AppConfig,
        single: bool,
    ) -> Result<Self> {
        let resource = schema.require(type_name)?;
        let select = select_columns(resource, query_params.fields.get(type_name));
        let (filters, mut joins, raw_filters) = resolve_filters(resource, schema, &query_params.filters)?;
        let (sort, sort_joins) = resolve_sort(resource, schema, &query_params.sort)?;
        merge_joins(&mut joins, sort_joins);
        let distinct = joins.iter().any(|j| j.one_to_many);

        let pagination = if single {
            None
        } else {
            Some(resolve_pagination(&query_params.page, config)?)
        };

        Ok(Self {
            type_name: type_name.to_string(),
            table: resource.descriptor.table.clone(),
            pk_columns: resource.descriptor.pk_columns.clone(),
            select,
            joins,
            filters,
            raw_filters,
            sort,
            pagination,
            distinct,
        })
    }

    pub fn has_pagination(&self) -> bool {
        self.pagination.is_some()
    }
}

/// Validate that every `include` path names real relationships and stays
/// within `max_include_depth`, returning the relationship chain for each.
pub fn validate_includes(
    type_name: &str,
    schema: &CompiledSchema,
    includes: &[IncludePath],
    config: &AppConfig,
) -> Result<Vec<IncludePath>> {
    for path in includes {
        if path.len() > config.max_include_depth as usize {
            return Err(Error::InvalidInclude(format!(
                "include path '{}' exceeds max depth {}",
                path.join("."),
                config.max_include_depth
            )));
        }
        let mut current = type_name.to_string();
        for segment in path {
            let resource = schema.require(&current)?;
            let rel = resource
                .relationship(segment)
                .ok_or_else(|| Error::InvalidInclude(format!("unknown relationship '{segment}' on '{current}'")))?;
            current = rel
                .target_types()
                .first()
                .cloned()
                .ok_or_else(|| Error::SchemaInvalid(format!("relationship '{segment}' has no target type")))?;
        }
    }
    Ok(includes.to_vec())
}

fn select_columns(resource: &CompiledResource, sparse_fields: Option<&Vec<String>>) -> Vec<SelectColumn> {
    let mut columns: Vec<SelectColumn> = resource
        .descriptor
        .pk_columns
        .iter()
        .map(|pk| SelectColumn {
            alias: String::new(),
            column: pk.clone(),
            output_name: pk.clone(),
            expression: None,
            is_relationship_key: false,
        })
        .collect();

    for field in &resource.descriptor.fields {
        use crate::schema::Hidden;
        if field.hidden == Hidden::Always {
            continue;
        }
        match sparse_fields {
            Some(wanted) => {
                if !wanted.iter().any(|w| w == &field.name) {
                    continue;
                }
            }
            None if field.hidden == Hidden::Normally => continue,
            None => {}
        }
        columns.push(SelectColumn {
            alias: String::new(),
            column: field.column.clone(),
            output_name: field.name.clone(),
            expression: field.computed.as_ref().map(|c| c.expression.clone()),
            is_relationship_key: false,
        });
    }

    // `belongsTo` foreign keys never appear as attributes (the compiler
    // rejects that shape), but the serializer still needs their value to
    // build `data.relationships.<rel>.data` linkage without requiring an
    // `include`. Project them under a name no real field can collide with.
    for rel in &resource.descriptor.relationships {
        match &rel.kind {
            crate::schema::RelationshipKind::BelongsTo { foreign_key, .. } => {
                columns.push(SelectColumn {
                    alias: String::new(),
                    column: foreign_key.clone(),
                    output_name: format!("__fk_{}", rel.name),
                    expression: None,
                    is_relationship_key: true,
                });
            }
            crate::schema::RelationshipKind::BelongsToPolymorphic { id_column, type_column, .. } => {
                columns.push(SelectColumn {
                    alias: String::new(),
                    column: id_column.clone(),
                    output_name: format!("__fk_{}", rel.name),
                    expression: None,
                    is_relationship_key: true,
                });
                columns.push(SelectColumn {
                    alias: String::new(),
                    column: type_column.clone(),
                    output_name: format!("__fktype_{}", rel.name),
                    expression: None,
                    is_relationship_key: true,
                });
            }
            _ => {}
        }
    }

    columns
}

fn resolve_filters(
    resource: &CompiledResource,
    schema: &CompiledSchema,
    terms: &[FilterTerm],
) -> Result<(Vec<ResolvedFilter>, Vec<PlannedJoin>, Vec<jsonapi_sql::Expr>)> {
    let mut filters = Vec::new();
    let mut joins: Vec<PlannedJoin> = Vec::new();
    let mut raw = Vec::new();

    for term in terms {
        if term.path.is_empty() && term.field == "search" {
            raw.push(resolve_search_column(resource, term)?);
            continue;
        }

        if term.path.is_empty() {
            if let Some(search_field) = resource.descriptor.search.as_ref().and_then(|s| s.fields.get(&term.field)) {
                let (target_joins, expr) = resolve_search_target(resource, schema, &search_field.target, term)?;
                merge_joins(&mut joins, target_joins);
                if let Some(expr) = expr {
                    raw.push(expr);
                }
                if let Some(apply) = &search_field.apply_filter {
                    raw.push(apply(&term.value));
                }
                continue;
            }

            let field = resource
                .field(&term.field)
                .ok_or_else(|| Error::Validation(vec![crate::error::ValidationFailure::new(
                    &format!("filter[{}]", term.field),
                    "unknown attribute".into(),
                )]))?;
            filters.push(ResolvedFilter {
                alias: String::new(),
                column: field.column.clone(),
                operator: term.operator.clone(),
                value: term.value.clone(),
            });
        } else {
            let (hop_joins, target) = resolve_join_path(resource, schema, &term.path)?;
            let alias = hop_joins.last().map(|j| j.alias.clone()).unwrap_or_default();
            merge_joins(&mut joins, hop_joins);
            let field = target
                .field(&term.field)
                .ok_or_else(|| Error::Validation(vec![crate::error::ValidationFailure::new(
                    &format!("filter[{}.{}]", term.path.join("."), term.field),
                    "unknown attribute".into(),
                )]))?;
            if !field.is_searchable_remote() {
                return Err(Error::Validation(vec![crate::error::ValidationFailure::new(
                    &format!("filter[{}.{}]", term.path.join("."), term.field),
                    "cross-table filters must terminate on an indexed field".into(),
                )]));
            }
            filters.push(ResolvedFilter {
                alias,
                column: field.column.clone(),
                operator: term.operator.clone(),
                value: term.value.clone(),
            });
        }
    }

    Ok((filters, joins, raw))
}

/// The reserved `filter[search]` key: an OR-across-`SearchDescriptor.columns`
/// `ILIKE` predicate over the resource's own table.
fn resolve_search_column(resource: &CompiledResource, term: &FilterTerm) -> Result<jsonapi_sql::Expr> {
    let columns = resource.descriptor.search.as_ref().map(|s| s.columns.as_slice()).unwrap_or(&[]);
    if columns.is_empty() {
        return Err(Error::Validation(vec![crate::error::ValidationFailure::new(
            "filter[search]",
            "resource has no search columns configured".into(),
        )]));
    }
    let refs: Vec<(String, String)> = columns.iter().map(|c| (String::new(), c.clone())).collect();
    Ok(crate::predicate::ilike_any(&refs, &search_needle(&term.value)))
}

/// Resolve one `searchSchema` filter key's [`crate::schema::SearchTarget`]
/// into the joins it needs (if any) plus the predicate it contributes.
fn resolve_search_target<'a>(
    resource: &'a CompiledResource,
    schema: &'a CompiledSchema,
    target: &crate::schema::SearchTarget,
    term: &FilterTerm,
) -> Result<(Vec<PlannedJoin>, Option<jsonapi_sql::Expr>)> {
    use crate::schema::SearchTarget;

    match target {
        SearchTarget::ActualField(path) => {
            let (joins, alias, column) = resolve_actual_field(resource, schema, path)?;
            let expr = crate::predicate::predicate_for(&alias, &column, &term.operator, &term.value);
            Ok((joins, Some(expr)))
        }
        SearchTarget::OneOf { fields, split_by, match_all } => {
            let mut joins = Vec::new();
            let mut refs = Vec::with_capacity(fields.len());
            for path in fields {
                let (field_joins, alias, column) = resolve_actual_field(resource, schema, path)?;
                merge_joins(&mut joins, field_joins);
                refs.push((alias, column));
            }
            let needle = search_needle(&term.value);
            let tokens: Vec<&str> = match split_by {
                Some(sep) => needle.split(sep.as_str()).filter(|t| !t.is_empty()).collect(),
                None => vec![needle.as_str()],
            };
            let per_token: Vec<jsonapi_sql::Expr> = tokens.iter().map(|t| crate::predicate::ilike_any(&refs, t)).collect();
            let expr = if *match_all { jsonapi_sql::Expr::and_all(per_token) } else { jsonapi_sql::Expr::or_all(per_token) };
            Ok((joins, Some(expr)))
        }
        SearchTarget::Polymorphic { field, target_fields } => {
            let rel = resource
                .relationship(field)
                .ok_or_else(|| Error::SchemaInvalid(format!("searchSchema polymorphic target references unknown relationship '{field}'")))?;
            let (id_column, type_column, target_types) = match &rel.kind {
                crate::schema::RelationshipKind::BelongsToPolymorphic { id_column, type_column, target_types } => {
                    (id_column.clone(), type_column.clone(), target_types.clone())
                }
                _ => {
                    return Err(Error::SchemaInvalid(format!(
                        "searchSchema polymorphic target '{field}' must name a polymorphic belongsTo relationship"
                    )))
                }
            };
            if target_fields.len() != target_types.len() {
                return Err(Error::SchemaInvalid(format!(
                    "searchSchema polymorphic target '{field}' declares {} targetFields for {} target types",
                    target_fields.len(),
                    target_types.len()
                )));
            }
            let mut branches = Vec::with_capacity(target_types.len());
            for (type_name, field_name) in target_types.iter().zip(target_fields.iter()) {
                let target_resource = schema.require(type_name)?;
                let column = target_resource
                    .field(field_name)
                    .ok_or_else(|| Error::SchemaInvalid(format!("searchSchema polymorphic target field '{field_name}' unknown on '{type_name}'")))?
                    .column
                    .clone();
                let pk = target_resource.descriptor.pk_columns.first().cloned().unwrap_or_else(|| "id".into());
                branches.push((type_name.clone(), target_resource.descriptor.table.clone(), pk, column));
            }
            let expr = crate::predicate::polymorphic_any(&resource.descriptor.table, &id_column, &type_column, &branches, &search_needle(&term.value));
            Ok((vec![], Some(expr)))
        }
    }
}

fn search_needle(value: &crate::request::FilterValue) -> String {
    match value {
        crate::request::FilterValue::Scalar(s) => s.clone(),
        crate::request::FilterValue::List(values) => values.join(" "),
    }
}

/// Resolve a `searchSchema actualField` dotted path — the same shape a
/// plain cross-relationship `filter[a.b]` term resolves to, except the last
/// segment names the field directly rather than coming from the term.
fn resolve_actual_field<'a>(
    resource: &'a CompiledResource,
    schema: &'a CompiledSchema,
    path: &[String],
) -> Result<(Vec<PlannedJoin>, String, String)> {
    let (hops, field_name) = path.split_at(path.len().saturating_sub(1));
    let field_name = field_name
        .first()
        .ok_or_else(|| Error::SchemaInvalid("searchSchema actualField path must not be empty".into()))?;

    if hops.is_empty() {
        let field = resource
            .field(field_name)
            .ok_or_else(|| Error::SchemaInvalid(format!("searchSchema actualField references unknown field '{field_name}'")))?;
        return Ok((vec![], String::new(), field.column.clone()));
    }

    let (joins, target) = resolve_join_path(resource, schema, hops)?;
    let alias = joins.last().map(|j| j.alias.clone()).unwrap_or_default();
    let field = target
        .field(field_name)
        .ok_or_else(|| Error::SchemaInvalid(format!("searchSchema actualField references unknown field '{field_name}'")))?;
    Ok((joins, alias, field.column.clone()))
}

fn resolve_sort(
    resource: &CompiledResource,
    schema: &CompiledSchema,
    terms: &[SortTerm],
) -> Result<(Vec<ResolvedSort>, Vec<PlannedJoin>)> {
    let mut sort = Vec::new();
    let mut joins: Vec<PlannedJoin> = Vec::new();
    for term in terms {
        if term.path.is_empty() {
            let field = resource
                .field(&term.field)
                .ok_or_else(|| Error::Validation(vec![crate::error::ValidationFailure::new(
                    &format!("sort={}", term.field),
                    "unknown attribute".into(),
                )]))?;
            sort.push(ResolvedSort {
                alias: String::new(),
                column: field.column.clone(),
                direction: term.direction.clone(),
            });
        } else {
            let (hop_joins, target) = resolve_join_path(resource, schema, &term.path)?;
            let alias = hop_joins.last().map(|j| j.alias.clone()).unwrap_or_default();
            merge_joins(&mut joins, hop_joins);
            let field = target
                .field(&term.field)
                .ok_or_else(|| Error::Validation(vec![crate::error::ValidationFailure::new(
                    &format!("sort={}.{}", term.path.join("."), term.field),
                    "unknown attribute".into(),
                )]))?;
            if !field.is_searchable_remote() {
                return Err(Error::Validation(vec![crate::error::ValidationFailure::new(
                    &format!("sort={}.{}", term.path.join("."), term.field),
                    "cross-table sort must terminate on an indexed field".into(),
                )]));
            }
            sort.push(ResolvedSort {
                alias,
                column: field.column.clone(),
                direction: term.direction.clone(),
            });
        }
    }
    Ok((sort, joins))
}

/// Fold freshly resolved hops into the plan's running join list, skipping
/// any hop whose alias a prior filter/sort term already added (two terms
/// walking the same dotted path share one join rather than joining twice).
fn merge_joins(joins: &mut Vec<PlannedJoin>, fresh: Vec<PlannedJoin>) {
    for join in fresh {
        if !joins.iter().any(|j| j.alias == join.alias) {
            joins.push(join);
        }
    }
}

/// Walk a full dotted relationship path hop by hop, following each landed-on
/// resource's own precomputed `join_index` for the next segment, and return
/// one [`PlannedJoin`] per hop plus the `CompiledResource` the last hop lands
/// on. The first hop joins against the query's root table (`left_alias:
/// None`); every later hop joins against the previous hop's alias.
fn resolve_join_path<'a>(
    resource: &'a CompiledResource,
    schema: &'a CompiledSchema,
    path: &[String],
) -> Result<(Vec<PlannedJoin>, &'a CompiledResource)> {
    let mut joins = Vec::with_capacity(path.len());
    let mut current = resource;
    let mut current_alias: Option<String> = None;
    let mut walked: Vec<&str> = Vec::with_capacity(path.len());

    for segment in path {
        walked.push(segment.as_str());
        let chain = current
            .join_index
            .get(segment)
            .ok_or_else(|| Error::InvalidInclude(format!("no join path for relationship '{segment}'")))?;
        let hop = chain
            .hops
            .first()
            .ok_or_else(|| Error::SchemaInvalid(format!("empty join chain for '{segment}'")))?;
        let rel = current
            .relationship(segment)
            .ok_or_else(|| Error::InvalidInclude(format!("unknown relationship '{segment}'")))?;

        let (left_col, right_col) = match &rel.kind {
            crate::schema::RelationshipKind::BelongsTo { foreign_key, .. } => {
                (foreign_key.clone(), "id".to_string())
            }
            crate::schema::RelationshipKind::HasOne { foreign_key, .. }
            | crate::schema::RelationshipKind::HasMany { foreign_key, .. } => {
                ("id".to_string(), foreign_key.clone())
            }
            crate::schema::RelationshipKind::HasManyPolymorphic { foreign_key, .. } => {
                ("id".to_string(), foreign_key.clone())
            }
            crate::schema::RelationshipKind::BelongsToPolymorphic { .. } => {
                return Err(Error::InvalidInclude(format!(
                    "filtering/sorting through polymorphic relationship '{segment}' is not supported"
                )));
            }
            crate::schema::RelationshipKind::ManyToMany { .. } => {
                return Err(Error::InvalidInclude(format!(
                    "filtering/sorting through many-to-many relationship '{segment}' is not supported"
                )));
            }
        };

        let target = schema.require(&hop.target_type)?;
        let alias = format!("j_{}", walked.join("_"));

        joins.push(PlannedJoin {
            alias: alias.clone(),
            table: target.descriptor.table.clone(),
            on_left_column: left_col,
            on_right_column: right_col,
            left_alias: current_alias.clone(),
            one_to_many: rel.is_to_many(),
        });

        current = target;
        current_alias = Some(alias);
    }

    Ok((joins, current))
}

fn resolve_pagination(page: &crate::request::PageParams, config: &AppConfig) -> Result<PaginationPlan> {
    if page.after.is_some() || page.before.is_some() {
        let limit = config.effective_page_size(page.size);
        let after = page.after.as_deref().map(Cursor::decode).transpose()?;
        let before = page.before.as_deref().map(Cursor::decode).transpose()?;
        return Ok(PaginationPlan::Cursor { limit, after, before });
    }

    let limit = config.effective_page_size(page.size);
    let number = page.number.unwrap_or(1).max(1);
    let offset = (number - 1) * limit;

    Ok(PaginationPlan::Offset {
        limit,
        offset,
        with_count: config.enable_pagination_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FilterOperator, FilterValue};
    use crate::schema::{compile, FieldDescriptor, RelationshipDescriptor, RelationshipKind, ResourceDescriptor};

    fn test_schema() -> CompiledSchema {
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: crate::request::QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("title", "title")],
            relationships: vec![RelationshipDescriptor {
                name: "author".into(),
                kind: RelationshipKind::BelongsTo {
                    foreign_key: "author_id".into(),
                    target_type: "people".into(),
                },
            }],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let people = ResourceDescriptor {
            type_name: "people".into(),
            table: crate::request::QualifiedIdentifier::new("public", "people"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor { indexed: true, ..FieldDescriptor::stored("name", "name") }],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        compile(vec![articles, people]).unwrap()
    }

    #[test]
    fn test_select_columns_includes_pk_and_fields() {
        let schema = test_schema();
        let resource = schema.require("articles").unwrap();
        let cols = select_columns(resource, None);
        assert_eq!(cols[0].output_name, "id");
        assert_eq!(cols[1].output_name, "title");
    }

    #[test]
    fn test_select_columns_respects_sparse_fieldset() {
        let schema = test_schema();
        let resource = schema.require("articles").unwrap();
        let wanted = vec![];
        let cols = select_columns(resource, Some(&wanted));
        assert_eq!(cols.len(), 1); // just the pk
    }

    #[test]
    fn test_resolve_simple_filter() {
        let schema = test_schema();
        let resource = schema.require("articles").unwrap();
        let terms = vec![FilterTerm {
            path: vec![],
            field: "title".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("Hello".into()),
        }];
        let (filters, joins, raw) = resolve_filters(resource, &schema, &terms).unwrap();
        assert_eq!(filters.len(), 1);
        assert!(joins.is_empty());
        assert!(raw.is_empty());
        assert_eq!(filters[0].column, "title");
    }

    #[test]
    fn test_resolve_cross_relationship_filter() {
        let schema = test_schema();
        let resource = schema.require("articles").unwrap();
        let terms = vec![FilterTerm {
            path: vec!["author".into()],
            field: "name".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("Jane".into()),
        }];
        let (filters, joins, _raw) = resolve_filters(resource, &schema, &terms).unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(joins.len(), 1);
        assert_eq!(filters[0].alias, "j_author");
    }

    #[test]
    fn test_resolve_cross_relationship_filter_rejects_non_indexed_field() {
        let terms = vec![FilterTerm {
            path: vec!["author".into()],
            field: "name".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("Jane".into()),
        }];
        // `people.name` isn't indexed here, unlike `test_schema()`'s variant.
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: crate::request::QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("title", "title")],
            relationships: vec![RelationshipDescriptor {
                name: "author".into(),
                kind: RelationshipKind::BelongsTo {
                    foreign_key: "author_id".into(),
                    target_type: "people".into(),
                },
            }],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let people = ResourceDescriptor {
            type_name: "people".into(),
            table: crate::request::QualifiedIdentifier::new("public", "people"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("name", "name")],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let unindexed_schema = compile(vec![articles, people]).unwrap();
        let resource = unindexed_schema.require("articles").unwrap();
        assert!(resolve_filters(resource, &unindexed_schema, &terms).is_err());
    }

    #[test]
    fn test_resolve_unknown_filter_field_errors() {
        let schema = test_schema();
        let resource = schema.require("articles").unwrap();
        let terms = vec![FilterTerm {
            path: vec![],
            field: "nope".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("x".into()),
        }];
        assert!(resolve_filters(resource, &schema, &terms).is_err());
    }

    fn test_schema_with_search() -> CompiledSchema {
        use crate::schema::{SearchDescriptor, SearchFieldDescriptor, SearchTarget};
        use indexmap::IndexMap;

        let mut fields = IndexMap::new();
        fields.insert(
            "authorName".to_string(),
            SearchFieldDescriptor {
                target: SearchTarget::ActualField(vec!["author".into(), "name".into()]),
                apply_filter: None,
            },
        );
        fields.insert(
            "q".to_string(),
            SearchFieldDescriptor {
                target: SearchTarget::OneOf {
                    fields: vec![vec!["title".into()], vec!["author".into(), "name".into()]],
                    split_by: Some(" ".into()),
                    match_all: true,
                },
                apply_filter: None,
            },
        );
        fields.insert(
            "commentableTitle".to_string(),
            SearchFieldDescriptor {
                target: SearchTarget::Polymorphic {
                    field: "commentable".into(),
                    target_fields: vec!["title".into(), "caption".into()],
                },
                apply_filter: None,
            },
        );

        let comments = ResourceDescriptor {
            type_name: "comments".into(),
            table: crate::request::QualifiedIdentifier::new("public", "comments"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("body", "body")],
            relationships: vec![RelationshipDescriptor {
                name: "commentable".into(),
                kind: RelationshipKind::BelongsToPolymorphic {
                    id_column: "commentable_id".into(),
                    type_column: "commentable_type".into(),
                    target_types: vec!["posts".into(), "videos".into()],
                },
            }],
            search: Some(SearchDescriptor { columns: vec!["body".into()], fields }),
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: crate::request::QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor { indexed: true, ..FieldDescriptor::stored("title", "title") }],
            relationships: vec![RelationshipDescriptor {
                name: "author".into(),
                kind: RelationshipKind::BelongsTo {
                    foreign_key: "author_id".into(),
                    target_type: "people".into(),
                },
            }],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let people = ResourceDescriptor {
            type_name: "people".into(),
            table: crate::request::QualifiedIdentifier::new("public", "people"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor { indexed: true, ..FieldDescriptor::stored("name", "name") }],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let posts = ResourceDescriptor {
            type_name: "posts".into(),
            table: crate::request::QualifiedIdentifier::new("public", "posts"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("title", "title")],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let videos = ResourceDescriptor {
            type_name: "videos".into(),
            table: crate::request::QualifiedIdentifier::new("public", "videos"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("caption", "caption")],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };

        compile(vec![comments, articles, people, posts, videos]).unwrap()
    }

    #[test]
    fn test_resolve_search_reserved_key_ilikes_search_columns() {
        let schema = test_schema_with_search();
        let resource = schema.require("comments").unwrap();
        let terms = vec![FilterTerm {
            path: vec![],
            field: "search".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("hello".into()),
        }];
        let (filters, joins, raw) = resolve_filters(resource, &schema, &terms).unwrap();
        assert!(filters.is_empty());
        assert!(joins.is_empty());
        assert_eq!(raw.len(), 1);
        assert!(raw[0].sql().contains("ILIKE"));
        assert!(raw[0].sql().contains("\"body\""));
    }

    #[test]
    fn test_resolve_search_actual_field_joins_relationship() {
        let schema = test_schema_with_search();
        let resource = schema.require("comments").unwrap();
        let terms = vec![FilterTerm {
            path: vec![],
            field: "authorName".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("Jane".into()),
        }];
        let (filters, joins, raw) = resolve_filters(resource, &schema, &terms).unwrap();
        assert!(filters.is_empty());
        assert_eq!(raw.len(), 1);
        assert_eq!(joins.len(), 1);
        assert!(raw[0].sql().contains("j_author"));
    }

    #[test]
    fn test_resolve_search_one_of_tokenizes_and_matches_all() {
        let schema = test_schema_with_search();
        let resource = schema.require("comments").unwrap();
        let terms = vec![FilterTerm {
            path: vec![],
            field: "q".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("foo bar".into()),
        }];
        let (filters, joins, raw) = resolve_filters(resource, &schema, &terms).unwrap();
        assert!(filters.is_empty());
        assert_eq!(joins.len(), 1);
        assert_eq!(raw.len(), 1);
        let sql = raw[0].sql();
        assert!(sql.contains(" AND "));
        assert!(sql.contains("ILIKE"));
    }

    #[test]
    fn test_resolve_search_polymorphic_fans_out_target_types() {
        let schema = test_schema_with_search();
        let resource = schema.require("comments").unwrap();
        let terms = vec![FilterTerm {
            path: vec![],
            field: "commentableTitle".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("launch".into()),
        }];
        let (filters, joins, raw) = resolve_filters(resource, &schema, &terms).unwrap();
        assert!(filters.is_empty());
        assert!(joins.is_empty());
        assert_eq!(raw.len(), 1);
        let sql = raw[0].sql();
        assert!(sql.contains("EXISTS"));
        assert!(sql.contains("\"posts\""));
        assert!(sql.contains("\"videos\""));
    }

    #[test]
    fn test_resolve_search_apply_filter_closure_is_anded_in() {
        use crate::schema::{SearchDescriptor, SearchFieldDescriptor, SearchTarget};
        use indexmap::IndexMap;

        let mut fields = IndexMap::new();
        fields.insert(
            "recent".to_string(),
            SearchFieldDescriptor {
                target: SearchTarget::ActualField(vec!["body".into()]),
                apply_filter: Some(std::sync::Arc::new(|_value: &FilterValue| {
                    jsonapi_sql::Expr::gt("created_at", "2020-01-01")
                })),
            },
        );
        let comments = ResourceDescriptor {
            type_name: "comments".into(),
            table: crate::request::QualifiedIdentifier::new("public", "comments"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("body", "body")],
            relationships: vec![],
            search: Some(SearchDescriptor { columns: vec![], fields }),
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let schema = compile(vec![comments]).unwrap();
        let resource = schema.require("comments").unwrap();
        let terms = vec![FilterTerm {
            path: vec![],
            field: "recent".into(),
            operator: FilterOperator::Eq,
            value: FilterValue::Scalar("anything".into()),
        }];
        let (_, _, raw) = resolve_filters(resource, &schema, &terms).unwrap();
        // one predicate from the `ActualField` target, one from `apply_filter`.
        assert_eq!(raw.len(), 2);
        assert!(raw[1].sql().contains("created_at"));
    }
}
