//! Request handling: parse -> authenticate -> plan -> execute -> serialize.
//!
//! This is the only place that talks to both axum and sqlx directly —
//! everything upstream (`jsonapi-core`) only ever produces parameterized
//! `SqlFragment`s, and everything downstream (`jsonapi-response`) only ever
//! consumes already-decoded `serde_json::Value` rows.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::Response as AxumResponse,
};
use jsonapi_auth::authenticate;
use jsonapi_core::{
    create_action_plan,
    error::{DatabaseError, Error, Result},
    pagination::{Cursor, CursorAxis, PageMeta},
    plan::{ActionPlan, MutatePlan, PaginationPlan, ReadPlan, RelationshipFetchPlan, RelationshipWrite},
    relationships::{plan_includes, resolve_relationship_op, IncludeNode},
    request::{parse_payload, parse_request, validate_media_type, validate_payload_type, ApiRequest, PreferRepresentation},
    schema::{CompiledResource, CompiledSchema, RelationshipKind},
    AppConfig,
};
use jsonapi_response::{
    document::{resource_object, EagerLinkage, JsonApiDocument, Linkage, PaginationMeta, PrimaryData, ResourceDocument, ResourceIdentifier},
    format_document, format_error, self_link, with_page_params, Response as ApiResponse,
};
use jsonapi_sql::{Expr, QueryBuilder, SqlFragment, SqlParam};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Column, Postgres, Row, TypeInfo};
use std::sync::Arc;
use tracing::{debug, error};

/// Main request handler. Never returns an `Err` — every failure is folded
/// into a JSON:API `{errors: [...]}` response.
pub async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> AxumResponse {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    debug!("{} {}", method, path);

    match process_request(&state, request).await {
        Ok(response) => into_axum_response(response),
        Err(e) => {
            error!("request failed: {}", e);
            into_axum_response(format_error(&e).unwrap_or_else(|_| ApiResponse::empty(StatusCode::INTERNAL_SERVER_ERROR)))
        }
    }
}

async fn process_request(state: &AppState, request: Request) -> Result<ApiResponse> {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let auth = authenticate(auth_header.as_deref(), &state.jwt_config)
        .map_err(|e| Error::Unauthorized(e.to_string()))?;
    debug!("authenticated as role: {}", auth.role);

    let (parts, body) = request.into_parts();
    let raw_query = parts.uri.query().unwrap_or("").to_string();
    let body_bytes = axum::body::to_bytes(body, 10 * 1024 * 1024)
        .await
        .map_err(|e| Error::Payload(e.to_string()))?;
    let has_body = !body_bytes.is_empty();

    validate_media_type(&parts.headers, has_body, state.config.strict_content_type)?;

    let mut builder = http::Request::builder().method(parts.method.clone()).uri(parts.uri.clone());
    for (key, value) in &parts.headers {
        builder = builder.header(key, value);
    }
    let http_request = builder
        .body(body_bytes.clone())
        .map_err(|e| Error::Internal(e.to_string()))?;

    let mut api_request = parse_request(&http_request)?;
    if has_body {
        api_request.payload = parse_payload(body_bytes)?;
        if let Some(payload) = &api_request.payload {
            if let Some(expected_type) = expected_payload_type(&api_request.action) {
                validate_payload_type(payload, expected_type)?;
            }
        }
    }

    let schema = state.schema.current().await?;
    let plan = create_action_plan(&api_request, &schema, &state.config)?;

    execute(state, &schema, &api_request, &raw_query, plan).await
}

/// The resource type a mutation's payload must declare, if any.
fn expected_payload_type(action: &jsonapi_core::request::Action) -> Option<&str> {
    use jsonapi_core::request::Action;
    match action {
        Action::CreateResource { type_name } | Action::UpdateResource { type_name, .. } | Action::UpsertResource { type_name, .. } => {
            Some(type_name.as_str())
        }
        _ => None,
    }
}

/// Dispatch on the execution plan and build the final framed response.
async fn execute(state: &AppState, schema: &CompiledSchema, request: &ApiRequest, raw_query: &str, plan: ActionPlan) -> Result<ApiResponse> {
    match plan {
        ActionPlan::FetchCollection { plan, includes } => {
            fetch_collection(state, schema, request, raw_query, plan, includes).await
        }
        ActionPlan::FetchResource { plan, id, includes } => {
            fetch_resource(state, schema, request, plan, id, includes).await
        }
        ActionPlan::FetchRelated(fetch_plan) => fetch_related(state, schema, request, fetch_plan).await,
        ActionPlan::FetchRelationship { parent_type, parent_id, relationship_name } => {
            fetch_relationship_linkage(state, schema, parent_type, parent_id, relationship_name).await
        }
        ActionPlan::Mutate(mutate_plan) => mutate(state, schema, request, mutate_plan).await,
        ActionPlan::RelationshipWrite { parent_type, parent_id, relationship_name, op } => {
            let statements = resolve_relationship_op(schema, &parent_type, &parent_id, &relationship_name, &op)?;
            let mut tx = state.pool.begin().await.map_err(map_sqlx_error)?;
            for stmt in &statements {
                for frag in QueryBuilder::build_linkage(stmt)? {
                    execute_fragment(&mut *tx, &frag).await?;
                }
            }
            tx.commit().await.map_err(map_sqlx_error)?;
            Ok(ApiResponse::empty(StatusCode::NO_CONTENT))
        }
    }
}

// ---------------------------------------------------------------------------
// Fetches
// ---------------------------------------------------------------------------

async fn fetch_collection(
    state: &AppState,
    schema: &CompiledSchema,
    request: &ApiRequest,
    raw_query: &str,
    plan: ReadPlan,
    includes: Vec<jsonapi_core::request::IncludePath>,
) -> Result<ApiResponse> {
    let resource = schema.require(&plan.type_name)?;
    let read_sql = QueryBuilder::build_read(&plan, None)?;
    let rows = fetch_all_fragment(&state.pool, &read_sql).await?;
    let json_rows: Vec<Map<String, Value>> = rows.iter().map(row_to_map).collect();

    let total = if plan.has_pagination() && state.config.enable_pagination_counts {
        match &plan.pagination {
            Some(PaginationPlan::Offset { with_count: true, .. }) => {
                let count_sql = QueryBuilder::build_count(&plan)?;
                let count_row = fetch_one_fragment(&state.pool, &count_sql).await?;
                count_row.try_get::<i64, _>(0).ok()
            }
            _ => None,
        }
    } else {
        None
    };

    let tree = plan_includes(&plan.type_name, schema, &includes)?;
    let (included, eager_by_row) = load_includes(state, schema, &tree, resource, &json_rows).await?;

    let url_prefix = effective_url_prefix(&state.config);
    let data: Vec<ResourceDocument> = json_rows
        .iter()
        .enumerate()
        .map(|(i, row)| resource_object(resource, row, eager_by_row.get(i), url_prefix))
        .collect();

    let meta = build_pagination_meta(&plan, total, json_rows.len(), &state.config);
    let links = build_collection_links(request, raw_query, &plan, total, &json_rows);

    let document = JsonApiDocument::new(PrimaryData::Many(data), included, links, meta);
    Ok(format_document(StatusCode::OK, &document, None)?)
}

async fn fetch_resource(
    state: &AppState,
    schema: &CompiledSchema,
    _request: &ApiRequest,
    plan: ReadPlan,
    id: String,
    includes: Vec<jsonapi_core::request::IncludePath>,
) -> Result<ApiResponse> {
    let resource = schema.require(&plan.type_name)?;
    let extra = pk_predicate(&plan.pk_columns, &id);
    let read_sql = QueryBuilder::build_read(&plan, Some(extra))?;
    let row = fetch_optional_fragment(&state.pool, &read_sql).await?;

    let Some(row) = row else {
        return Err(Error::NotFound(format!("{}/{}", plan.type_name, id)));
    };
    let row = row_to_map(&row);

    let tree = plan_includes(&plan.type_name, schema, &includes)?;
    let (included, eager_by_row) = load_includes(state, schema, &tree, resource, std::slice::from_ref(&row)).await?;

    let url_prefix = effective_url_prefix(&state.config);
    let doc = resource_object(resource, &row, eager_by_row.first(), url_prefix);

    let document = JsonApiDocument::new(PrimaryData::One(Some(doc)), included, Default::default(), Default::default());
    Ok(format_document(StatusCode::OK, &document, None)?)
}

async fn fetch_related(
    state: &AppState,
    schema: &CompiledSchema,
    _request: &ApiRequest,
    fetch_plan: RelationshipFetchPlan,
) -> Result<ApiResponse> {
    let parent_resource = schema.require(&fetch_plan.parent_type)?;
    let rel = parent_resource
        .relationship(&fetch_plan.relationship_name)
        .ok_or_else(|| Error::NotFound(format!("relationship '{}' on '{}'", fetch_plan.relationship_name, fetch_plan.parent_type)))?;

    // The actual target type is only known per row for a polymorphic
    // `belongsTo`; `fetch_plan.target` was built against an arbitrary
    // `target_types().first()` guess at plan-creation time, so resolve the
    // real `(type, id)` pair here instead of trusting it.
    if let RelationshipKind::BelongsToPolymorphic { id_column, type_column, .. } = &rel.kind {
        return fetch_related_polymorphic(state, parent_resource, id_column, type_column, &fetch_plan.parent_id, fetch_plan.single).await;
    }

    let target_resource = schema.require(&fetch_plan.target.type_name)?;

    let extra = related_predicate(state, &rel.kind, &fetch_plan.parent_type, &fetch_plan.parent_id).await?;
    let Some(extra) = extra else {
        // belongsTo whose foreign key is null: the related resource is empty.
        let document = JsonApiDocument::new(
            if fetch_plan.single { PrimaryData::One(None) } else { PrimaryData::Many(vec![]) },
            vec![],
            Default::default(),
            Default::default(),
        );
        return Ok(format_document(StatusCode::OK, &document, None)?);
    };

    let read_sql = QueryBuilder::build_read(&fetch_plan.target, Some(extra))?;
    let url_prefix = effective_url_prefix(&state.config);

    if fetch_plan.single {
        let row = fetch_optional_fragment(&state.pool, &read_sql).await?;
        let data = row.as_ref().map(|r| resource_object(target_resource, &row_to_map(r), None, url_prefix));
        let document = JsonApiDocument::new(PrimaryData::One(data), vec![], Default::default(), Default::default());
        Ok(format_document(StatusCode::OK, &document, None)?)
    } else {
        let rows = fetch_all_fragment(&state.pool, &read_sql).await?;
        let data: Vec<ResourceDocument> = rows.iter().map(|r| resource_object(target_resource, &row_to_map(r), None, url_prefix)).collect();
        let document = JsonApiDocument::new(PrimaryData::Many(data), vec![], Default::default(), Default::default());
        Ok(format_document(StatusCode::OK, &document, None)?)
    }
}

/// Resolve a polymorphic `belongsTo`'s single related resource: look up the
/// `(type, id)` pair the parent row actually holds, then build and run a
/// fresh one-off `ReadPlan` for that concrete type.
async fn fetch_related_polymorphic(
    state: &AppState,
    parent_resource: &CompiledResource,
    id_column: &str,
    type_column: &str,
    parent_id: &str,
    single: bool,
) -> Result<ApiResponse> {
    let empty = || {
        JsonApiDocument::new(
            if single { PrimaryData::One(None) } else { PrimaryData::Many(vec![]) },
            vec![],
            Default::default(),
            Default::default(),
        )
    };

    let Some((target_type, target_id)) = fetch_polymorphic_ref(state, parent_resource, id_column, type_column, parent_id).await? else {
        return Ok(format_document(StatusCode::OK, &empty(), None)?);
    };

    let schema = state.schema.current().await?;
    let Ok(target_resource) = schema.require(&target_type) else {
        return Ok(format_document(StatusCode::OK, &empty(), None)?);
    };

    let config = AppConfig::default();
    let query_params = jsonapi_core::request::QueryParams::default();
    let mut target_plan = ReadPlan::for_primary(&target_type, &schema, &query_params, &config, true)?;
    target_plan.pagination = None;
    let extra = pk_predicate(&target_resource.descriptor.pk_columns, &target_id);
    let read_sql = QueryBuilder::build_read(&target_plan, Some(extra))?;
    let url_prefix = effective_url_prefix(&state.config);
    let row = fetch_optional_fragment(&state.pool, &read_sql).await?;
    let data = row.as_ref().map(|r| resource_object(target_resource, &row_to_map(r), None, url_prefix));
    let document = JsonApiDocument::new(PrimaryData::One(data), vec![], Default::default(), Default::default());
    Ok(format_document(StatusCode::OK, &document, None)?)
}

/// Read the `(type, id)` pair a polymorphic `belongsTo` row currently holds.
async fn fetch_polymorphic_ref(
    state: &AppState,
    parent_resource: &CompiledResource,
    id_column: &str,
    type_column: &str,
    parent_id: &str,
) -> Result<Option<(String, String)>> {
    let mut frag = SqlFragment::raw(format!(
        "SELECT {}, {} FROM {} WHERE ",
        jsonapi_sql::escape_ident(id_column),
        jsonapi_sql::escape_ident(type_column),
        jsonapi_sql::from_qi(&parent_resource.descriptor.table),
    ));
    frag.append(pk_predicate(&parent_resource.descriptor.pk_columns, parent_id).into_fragment());
    let row = fetch_optional_fragment(&state.pool, &frag).await?;
    Ok(row.and_then(|r| {
        let id = scalar_param(&r, 0).map(|p| param_to_id(&p))?;
        let type_name: String = r.try_get(1).ok()?;
        Some((type_name, id))
    }))
}

async fn fetch_relationship_linkage(
    state: &AppState,
    schema: &CompiledSchema,
    parent_type: String,
    parent_id: String,
    relationship_name: String,
) -> Result<ApiResponse> {
    let parent_resource = schema.require(&parent_type)?;
    let rel = parent_resource
        .relationship(&relationship_name)
        .ok_or_else(|| Error::NotFound(format!("relationship '{relationship_name}' on '{parent_type}'")))?;

    let linkage = if let RelationshipKind::BelongsToPolymorphic { id_column, type_column, .. } = &rel.kind {
        match fetch_polymorphic_ref(state, parent_resource, id_column, type_column, &parent_id).await? {
            Some((target_type, target_id)) => serde_json::json!({ "type": target_type, "id": target_id }),
            None => Value::Null,
        }
    } else {
        fetch_linkage(state, &rel.kind, &parent_type, &parent_id).await?
    };
    let body = serde_json::to_vec(&serde_json::json!({ "data": linkage }))
        .map_err(|e| Error::Internal(e.to_string()))?;
    let mut response = ApiResponse::new(StatusCode::OK, body);
    response.headers = jsonapi_response::build_response_headers(None);
    Ok(response)
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

async fn mutate(state: &AppState, schema: &CompiledSchema, request: &ApiRequest, plan: MutatePlan) -> Result<ApiResponse> {
    let minimal = matches!(request.preferences.representation, PreferRepresentation::Minimal);

    match plan {
        MutatePlan::Delete { type_name, ref cascade_many_to_many, id, .. } => {
            let mut tx = state.pool.begin().await.map_err(map_sqlx_error)?;
            for frag in QueryBuilder::build_cascade_deletes(cascade_many_to_many, &id) {
                execute_fragment(&mut *tx, &frag).await?;
            }
            let delete_sql = QueryBuilder::build_mutate(&plan)?;
            let row = fetch_optional_fragment(&mut *tx, &delete_sql).await?;
            tx.commit().await.map_err(map_sqlx_error)?;
            if row.is_none() {
                return Err(Error::NotFound(format!("{type_name}/{id}")));
            }
            Ok(ApiResponse::empty(StatusCode::NO_CONTENT))
        }
        MutatePlan::Create { ref type_name, ref relationship_writes, .. } => {
            let type_name = type_name.clone();
            let resource = schema.require(&type_name)?;
            let mut tx = state.pool.begin().await.map_err(map_sqlx_error)?;
            let insert_sql = QueryBuilder::build_mutate(&plan)?;
            let row = fetch_one_fragment(&mut *tx, &insert_sql).await?;
            let row = row_to_map(&row);
            let id = primary_key_of(resource, &row);
            run_relationship_writes(&mut tx, schema, relationship_writes, &id).await?;
            tx.commit().await.map_err(map_sqlx_error)?;

            let url_prefix = effective_url_prefix(&state.config);
            let location = url_prefix.map(|p| format!("{p}/{type_name}/{id}"));
            if minimal {
                let mut response = ApiResponse::empty(StatusCode::NO_CONTENT);
                if let Some(location) = &location {
                    response.headers = jsonapi_response::build_response_headers(Some(location));
                }
                Ok(response)
            } else {
                let doc = resource_object(resource, &row, None, url_prefix);
                let document = JsonApiDocument::new(PrimaryData::One(Some(doc)), vec![], Default::default(), Default::default());
                Ok(format_document(StatusCode::CREATED, &document, location.as_deref())?)
            }
        }
        MutatePlan::Update { ref type_name, ref relationship_writes, ref id, .. }
        | MutatePlan::Upsert { ref type_name, ref relationship_writes, ref id, .. } => {
            let type_name = type_name.clone();
            let id = id.clone();
            let resource = schema.require(&type_name)?;
            let mut tx = state.pool.begin().await.map_err(map_sqlx_error)?;
            let sql = QueryBuilder::build_mutate(&plan)?;
            let row = fetch_optional_fragment(&mut *tx, &sql).await?;
            let Some(row) = row else {
                tx.rollback().await.ok();
                return Err(Error::NotFound(format!("{type_name}/{id}")));
            };
            let row = row_to_map(&row);
            run_relationship_writes(&mut tx, schema, relationship_writes, &id).await?;
            tx.commit().await.map_err(map_sqlx_error)?;

            if minimal {
                Ok(ApiResponse::empty(StatusCode::NO_CONTENT))
            } else {
                let url_prefix = effective_url_prefix(&state.config);
                let doc = resource_object(resource, &row, None, url_prefix);
                let document = JsonApiDocument::new(PrimaryData::One(Some(doc)), vec![], Default::default(), Default::default());
                Ok(format_document(StatusCode::OK, &document, None)?)
            }
        }
    }
}

async fn run_relationship_writes(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    schema: &CompiledSchema,
    writes: &[RelationshipWrite],
    parent_id: &str,
) -> Result<()> {
    for write in writes {
        for frag in QueryBuilder::build_relationship_write(write, schema, parent_id)? {
            execute_fragment(&mut **tx, &frag).await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Relationship-engine predicates (links the target read plan back to its parent row)
// ---------------------------------------------------------------------------

/// Resolve the predicate that links a relationship's target rows back to
/// the parent. Returns `None` only for a `belongsTo` whose foreign key is
/// currently null, meaning there is nothing to fetch.
async fn related_predicate(state: &AppState, kind: &RelationshipKind, parent_type: &str, parent_id: &str) -> Result<Option<Expr>> {
    match kind {
        RelationshipKind::BelongsTo { foreign_key, .. } => {
            let schema = state.schema.current().await?;
            let parent_resource = schema.require(parent_type)?;
            let mut frag = SqlFragment::raw(format!(
                "SELECT {} FROM {} WHERE ",
                jsonapi_sql::escape_ident(foreign_key),
                jsonapi_sql::from_qi(&parent_resource.descriptor.table),
            ));
            frag.append(pk_predicate(&parent_resource.descriptor.pk_columns, parent_id).into_fragment());
            let row = fetch_optional_fragment(&state.pool, &frag).await?;
            match row.and_then(|r| r.try_get::<Option<String>, _>(0).ok().flatten().or_else(|| r.try_get::<Option<i64>, _>(0).ok().flatten().map(|v| v.to_string()))) {
                Some(fk_value) => Ok(Some(Expr::eq("id", fk_value))),
                None => Ok(None),
            }
        }
        RelationshipKind::HasOne { foreign_key, .. } | RelationshipKind::HasMany { foreign_key, .. } => {
            Ok(Some(Expr::eq(foreign_key, parent_id.to_string())))
        }
        RelationshipKind::HasManyPolymorphic { foreign_key, foreign_type_column, discriminant, .. } => {
            Ok(Some(Expr::eq(foreign_key, parent_id.to_string()).and(Expr::eq(foreign_type_column, discriminant.clone()))))
        }
        RelationshipKind::ManyToMany { join_table, source_fk, target_fk, .. } => {
            let mut frag = SqlFragment::raw(format!(
                "SELECT {} FROM {} WHERE {} = ",
                jsonapi_sql::escape_ident(target_fk),
                jsonapi_sql::from_qi(join_table),
                jsonapi_sql::escape_ident(source_fk),
            ));
            frag.push_param(parent_id.to_string());
            let rows = fetch_all_fragment(&state.pool, &frag).await?;
            let ids: Vec<SqlParam> = rows.iter().filter_map(|r| scalar_param(r, 0)).collect();
            Ok(Some(Expr::in_list("id", ids)))
        }
        RelationshipKind::BelongsToPolymorphic { .. } => {
            // The target type is only known per row; callers resolve this
            // kind via `fetch_polymorphic_ref` instead of a predicate.
            Err(Error::Internal("polymorphic belongsTo has no single related_predicate".into()))
        }
    }
}

/// Fetch bare linkage (no attributes) for `/{type}/{id}/relationships/{rel}`.
async fn fetch_linkage(state: &AppState, kind: &RelationshipKind, parent_type: &str, parent_id: &str) -> Result<Value> {
    let target_type = kind_target_type(kind);
    match kind {
        RelationshipKind::BelongsTo { .. } | RelationshipKind::HasOne { .. } => {
            let extra = related_predicate(state, kind, parent_type, parent_id).await?;
            match extra {
                None => Ok(Value::Null),
                Some(extra) => {
                    let id = resolve_single_target_id(state, kind, extra).await?;
                    Ok(match id {
                        Some(id) => serde_json::json!({ "type": target_type, "id": id }),
                        None => Value::Null,
                    })
                }
            }
        }
        _ => {
            let extra = related_predicate(state, kind, parent_type, parent_id).await?.unwrap_or_else(|| Expr::and_all(Vec::new()));
            let ids = resolve_target_ids(state, kind, extra).await?;
            Ok(Value::Array(
                ids.into_iter()
                    .map(|id| serde_json::json!({ "type": target_type, "id": id }))
                    .collect(),
            ))
        }
    }
}

fn kind_target_type(kind: &RelationshipKind) -> &str {
    match kind {
        RelationshipKind::BelongsTo { target_type, .. }
        | RelationshipKind::HasOne { target_type, .. }
        | RelationshipKind::HasMany { target_type, .. }
        | RelationshipKind::ManyToMany { target_type, .. } => target_type,
        RelationshipKind::HasManyPolymorphic { target_types, .. } | RelationshipKind::BelongsToPolymorphic { target_types, .. } => {
            target_types.first().map(String::as_str).unwrap_or("")
        }
    }
}

async fn resolve_single_target_id(state: &AppState, kind: &RelationshipKind, extra: Expr) -> Result<Option<String>> {
    let target_type = kind_target_type(kind).to_string();
    let schema = state.schema.current().await?;
    let resource = schema.require(&target_type)?;
    let mut frag = SqlFragment::raw(format!(
        "SELECT {} FROM {} WHERE ",
        resource.descriptor.pk_columns.iter().map(|c| jsonapi_sql::escape_ident(c)).collect::<Vec<_>>().join(", "),
        jsonapi_sql::from_qi(&resource.descriptor.table),
    ));
    frag.append(extra.into_fragment());
    let row = fetch_optional_fragment(&state.pool, &frag).await?;
    Ok(row.and_then(|r| scalar_param(&r, 0)).map(|p| param_to_id(&p)))
}

async fn resolve_target_ids(state: &AppState, kind: &RelationshipKind, extra: Expr) -> Result<Vec<String>> {
    let target_type = kind_target_type(kind).to_string();
    let schema = state.schema.current().await?;
    let resource = schema.require(&target_type)?;
    let mut frag = SqlFragment::raw(format!(
        "SELECT {} FROM {} WHERE ",
        resource.descriptor.pk_columns.iter().map(|c| jsonapi_sql::escape_ident(c)).collect::<Vec<_>>().join(", "),
        jsonapi_sql::from_qi(&resource.descriptor.table),
    ));
    frag.append(extra.into_fragment());
    let rows = fetch_all_fragment(&state.pool, &frag).await?;
    Ok(rows.iter().filter_map(|r| scalar_param(r, 0)).map(|p| param_to_id(&p)).collect())
}

// ---------------------------------------------------------------------------
// Eager loading (`include`)
// ---------------------------------------------------------------------------

/// For every node in the include forest, batch-fetch the children of every
/// parent row, bucket them by parent id into an `EagerLinkage` entry, and
/// recurse into nested include paths. Returns the flattened `included` set
/// (deduplication happens in `JsonApiDocument::new`) plus one `EagerLinkage`
/// per parent row, in the same order as `parent_rows`.
async fn load_includes(
    state: &AppState,
    schema: &CompiledSchema,
    nodes: &[IncludeNode],
    parent_resource: &CompiledResource,
    parent_rows: &[Map<String, Value>],
) -> Result<(Vec<ResourceDocument>, Vec<EagerLinkage>)> {
    let mut included = Vec::new();
    let mut eager_by_row: Vec<EagerLinkage> = parent_rows.iter().map(|_| EagerLinkage::new()).collect();

    if parent_rows.is_empty() {
        return Ok((included, eager_by_row));
    }

    let parent_ids: Vec<String> = parent_rows.iter().map(|row| primary_key_of(parent_resource, row)).collect();

    for node in nodes {
        let rel = parent_resource
            .relationship(&node.relationship_name)
            .ok_or_else(|| Error::InvalidInclude(format!("unknown relationship '{}'", node.relationship_name)))?;

        if let RelationshipKind::BelongsToPolymorphic { .. } = &rel.kind {
            // Every possible target type is resolved per row, from the
            // parent's own projected columns, rather than through a single
            // precomputed `target_resource` — nested includes under a
            // polymorphic belongsTo (`include=commentable.something`) are
            // not walked further.
            let (polymorphic_included, polymorphic_linkage) = load_polymorphic_belongs_to(state, schema, rel, parent_rows).await?;
            for (i, linkage) in polymorphic_linkage.into_iter().enumerate() {
                eager_by_row[i].insert(node.relationship_name.clone(), linkage);
            }
            included.extend(polymorphic_included);
            continue;
        }

        let target_resource = schema.require(&node.target_type)?;

        let (child_rows, child_maps, linkage_by_parent) =
            fetch_children(state, &rel.kind, parent_resource, target_resource, &parent_ids).await?;

        for (i, parent_id) in parent_ids.iter().enumerate() {
            let linkage = linkage_by_parent
                .get(parent_id)
                .cloned()
                .unwrap_or_else(|| if rel.is_to_many() { Linkage::ToMany(vec![]) } else { Linkage::ToOne(None) });
            eager_by_row[i].insert(node.relationship_name.clone(), linkage);
        }

        let url_prefix = effective_url_prefix(&state.config);
        let (grandchild_included, grandchild_eager) =
            Box::pin(load_includes(state, schema, &node.children, target_resource, &child_maps)).await?;

        included.extend(
            child_maps
                .iter()
                .enumerate()
                .map(|(i, row)| resource_object(target_resource, row, grandchild_eager.get(i), url_prefix)),
        );
        included.extend(grandchild_included);
        let _ = child_rows;
    }

    Ok((included, eager_by_row))
}

/// Batch-fetch a polymorphic `belongsTo`'s related rows, grouped by the
/// concrete type each parent row's projected `__fktype_<rel>` column names,
/// with one query per distinct target type actually present in the batch.
async fn load_polymorphic_belongs_to(
    state: &AppState,
    schema: &CompiledSchema,
    rel: &jsonapi_core::schema::RelationshipDescriptor,
    parent_rows: &[Map<String, Value>],
) -> Result<(Vec<ResourceDocument>, Vec<Linkage>)> {
    use std::collections::HashMap;

    let id_key = format!("__fk_{}", rel.name);
    let type_key = format!("__fktype_{}", rel.name);

    let mut ids_by_type: HashMap<String, Vec<String>> = HashMap::new();
    for row in parent_rows {
        match (row.get(&id_key), row.get(&type_key)) {
            (Some(id_val), Some(type_val)) if !id_val.is_null() && !type_val.is_null() => {
                ids_by_type.entry(scalar_to_string(type_val)).or_default().push(scalar_to_string(id_val));
            }
            _ => {}
        }
    }

    let mut rows_by_type_and_id: HashMap<(String, String), ()> = HashMap::new();
    let mut included = Vec::new();
    let url_prefix = effective_url_prefix(&state.config);
    let config = AppConfig::default();
    let query_params = jsonapi_core::request::QueryParams::default();

    for (target_type, ids) in &ids_by_type {
        let Ok(target_resource) = schema.require(target_type) else { continue };
        let mut target_plan = ReadPlan::for_primary(target_type, schema, &query_params, &config, false)?;
        target_plan.pagination = None;
        let params: Vec<SqlParam> = ids.iter().cloned().map(SqlParam::Text).collect();
        let sql = QueryBuilder::build_read(&target_plan, Some(Expr::in_list("id", params)))?;
        let fetched = fetch_all_fragment(&state.pool, &sql).await?;
        for r in &fetched {
            let m = row_to_map(r);
            let id = primary_key_of(target_resource, &m);
            included.push(resource_object(target_resource, &m, None, url_prefix));
            rows_by_type_and_id.insert((target_type.clone(), id), ());
        }
    }

    let eager = parent_rows
        .iter()
        .map(|row| match (row.get(&id_key), row.get(&type_key)) {
            (Some(id_val), Some(type_val)) if !id_val.is_null() && !type_val.is_null() => {
                let type_name = scalar_to_string(type_val);
                let id = scalar_to_string(id_val);
                if rows_by_type_and_id.contains_key(&(type_name.clone(), id.clone())) {
                    Linkage::ToOne(Some(ResourceIdentifier { type_name, id }))
                } else {
                    Linkage::ToOne(None)
                }
            }
            _ => Linkage::ToOne(None),
        })
        .collect();

    Ok((included, eager))
}

/// Batch-fetch every child row for a relationship across all parent ids in
/// one query, keyed back to the owning parent.
#[allow(clippy::type_complexity)]
async fn fetch_children(
    state: &AppState,
    kind: &RelationshipKind,
    parent_resource: &CompiledResource,
    target_resource: &CompiledResource,
    parent_ids: &[String],
) -> Result<(Vec<PgRow>, Vec<Map<String, Value>>, std::collections::HashMap<String, Linkage>)> {
    use std::collections::HashMap;

    let config = AppConfig::default();
    let query_params = jsonapi_core::request::QueryParams::default();
    let mut target_plan = ReadPlan::for_primary(&target_resource.descriptor.type_name, &compiled_schema_of(state).await?, &query_params, &config, false)?;
    target_plan.pagination = None;

    match kind {
        RelationshipKind::BelongsTo { foreign_key, .. } => {
            let fk_values = fetch_foreign_keys(state, parent_resource, foreign_key, parent_ids).await?;
            let ids: Vec<SqlParam> = fk_values.values().filter_map(|v| v.clone()).collect();
            if ids.is_empty() {
                return Ok((vec![], vec![], HashMap::new()));
            }
            let extra = Expr::in_list("id", ids);
            let sql = QueryBuilder::build_read(&target_plan, Some(extra))?;
            let rows = fetch_all_fragment(&state.pool, &sql).await?;
            let maps: Vec<Map<String, Value>> = rows.iter().map(row_to_map).collect();
            let mut by_id: HashMap<String, Map<String, Value>> = HashMap::new();
            for m in &maps {
                by_id.insert(primary_key_of(target_resource, m), m.clone());
            }
            let mut linkage = HashMap::new();
            for (parent_id, fk) in &fk_values {
                let target_id = fk.as_ref().map(param_to_id);
                linkage.insert(
                    parent_id.clone(),
                    Linkage::ToOne(target_id.and_then(|id| by_id.get(&id).map(|_| ResourceIdentifier { type_name: target_resource.descriptor.type_name.clone(), id }))),
                );
            }
            Ok((rows, maps, linkage))
        }
        RelationshipKind::HasOne { foreign_key, .. } | RelationshipKind::HasMany { foreign_key, .. } => {
            let ids: Vec<SqlParam> = parent_ids.iter().map(|id| SqlParam::Text(id.clone())).collect();
            let extra = Expr::in_list(foreign_key, ids);
            let sql = QueryBuilder::build_read(&target_plan, Some(extra))?;
            let rows = fetch_all_fragment(&state.pool, &sql).await?;
            let maps: Vec<Map<String, Value>> = rows.iter().map(row_to_map).collect();
            let mut linkage: HashMap<String, Linkage> = HashMap::new();
            let to_many = matches!(kind, RelationshipKind::HasMany { .. });
            for m in &maps {
                let parent_id = m.get(&format!("__fk_{foreign_key}")).map(scalar_to_string).unwrap_or_else(|| {
                    // The child's own foreign-key column is not itself projected
                    // under `__fk_<rel>` (that synthetic alias only exists on the
                    // parent side); read the raw column directly.
                    m.get(foreign_key).map(scalar_to_string).unwrap_or_default()
                });
                let identifier = ResourceIdentifier { type_name: target_resource.descriptor.type_name.clone(), id: primary_key_of(target_resource, m) };
                linkage
                    .entry(parent_id)
                    .and_modify(|l| push_linkage(l, identifier.clone(), to_many))
                    .or_insert_with(|| if to_many { Linkage::ToMany(vec![identifier.clone()]) } else { Linkage::ToOne(Some(identifier.clone())) });
            }
            Ok((rows, maps, linkage))
        }
        RelationshipKind::HasManyPolymorphic { foreign_key, foreign_type_column, discriminant, .. } => {
            let ids: Vec<SqlParam> = parent_ids.iter().map(|id| SqlParam::Text(id.clone())).collect();
            let extra = Expr::in_list(foreign_key, ids).and(Expr::eq(foreign_type_column, discriminant.clone()));
            let sql = QueryBuilder::build_read(&target_plan, Some(extra))?;
            let rows = fetch_all_fragment(&state.pool, &sql).await?;
            let maps: Vec<Map<String, Value>> = rows.iter().map(row_to_map).collect();
            let mut linkage: HashMap<String, Linkage> = HashMap::new();
            for m in &maps {
                let parent_id = m.get(foreign_key).map(scalar_to_string).unwrap_or_default();
                let identifier = ResourceIdentifier { type_name: target_resource.descriptor.type_name.clone(), id: primary_key_of(target_resource, m) };
                linkage
                    .entry(parent_id)
                    .and_modify(|l| push_linkage(l, identifier.clone(), true))
                    .or_insert_with(|| Linkage::ToMany(vec![identifier.clone()]));
            }
            Ok((rows, maps, linkage))
        }
        RelationshipKind::ManyToMany { join_table, source_fk, target_fk, .. } => {
            let mut join_sql = SqlFragment::raw(format!(
                "SELECT {}, {} FROM {} WHERE {} IN (",
                jsonapi_sql::escape_ident(source_fk),
                jsonapi_sql::escape_ident(target_fk),
                jsonapi_sql::from_qi(join_table),
                jsonapi_sql::escape_ident(source_fk),
            ));
            for (i, id) in parent_ids.iter().enumerate() {
                if i > 0 {
                    join_sql.push(", ");
                }
                join_sql.push_param(id.clone());
            }
            join_sql.push(")");
            let join_rows = fetch_all_fragment(&state.pool, &join_sql).await?;

            let mut parent_to_target: HashMap<String, Vec<String>> = HashMap::new();
            let mut all_target_ids: Vec<SqlParam> = Vec::new();
            for row in &join_rows {
                if let (Some(parent_param), Some(target_param)) = (scalar_param(row, 0), scalar_param(row, 1)) {
                    parent_to_target.entry(param_to_id(&parent_param)).or_default().push(param_to_id(&target_param));
                    all_target_ids.push(target_param);
                }
            }

            if all_target_ids.is_empty() {
                return Ok((vec![], vec![], HashMap::new()));
            }

            let extra = Expr::in_list("id", all_target_ids);
            let sql = QueryBuilder::build_read(&target_plan, Some(extra))?;
            let rows = fetch_all_fragment(&state.pool, &sql).await?;
            let maps: Vec<Map<String, Value>> = rows.iter().map(row_to_map).collect();
            let mut by_id: HashMap<String, Map<String, Value>> = HashMap::new();
            for m in &maps {
                by_id.insert(primary_key_of(target_resource, m), m.clone());
            }

            let mut linkage: HashMap<String, Linkage> = HashMap::new();
            for (parent_id, target_ids) in &parent_to_target {
                let identifiers: Vec<ResourceIdentifier> = target_ids
                    .iter()
                    .filter(|id| by_id.contains_key(*id))
                    .map(|id| ResourceIdentifier { type_name: target_resource.descriptor.type_name.clone(), id: id.clone() })
                    .collect();
                linkage.insert(parent_id.clone(), Linkage::ToMany(identifiers));
            }
            Ok((rows, maps, linkage))
        }
        RelationshipKind::BelongsToPolymorphic { .. } => {
            // Resolved directly in `load_includes` from the parent rows'
            // own projected `__fk_`/`__fktype_` columns, not here.
            Err(Error::Internal("polymorphic belongsTo is resolved by load_includes, not fetch_children".into()))
        }
    }
}

fn push_linkage(linkage: &mut Linkage, identifier: ResourceIdentifier, to_many: bool) {
    match linkage {
        Linkage::ToMany(ids) if to_many => ids.push(identifier),
        _ => {}
    }
}

/// Fetch the `{foreign_key}` column for every parent row by id, for the
/// `belongsTo` include case where the parent holds the FK.
async fn fetch_foreign_keys(
    state: &AppState,
    parent_resource: &CompiledResource,
    foreign_key: &str,
    parent_ids: &[String],
) -> Result<std::collections::HashMap<String, Option<SqlParam>>> {
    use std::collections::HashMap;
    let pk = parent_resource.descriptor.pk_columns.first().cloned().unwrap_or_else(|| "id".to_string());
    let mut frag = SqlFragment::raw(format!(
        "SELECT {}, {} FROM {} WHERE {} IN (",
        jsonapi_sql::escape_ident(&pk),
        jsonapi_sql::escape_ident(foreign_key),
        jsonapi_sql::from_qi(&parent_resource.descriptor.table),
        jsonapi_sql::escape_ident(&pk),
    ));
    for (i, id) in parent_ids.iter().enumerate() {
        if i > 0 {
            frag.push(", ");
        }
        frag.push_param(id.clone());
    }
    frag.push(")");
    let rows = fetch_all_fragment(&state.pool, &frag).await?;
    let mut out = HashMap::new();
    for row in &rows {
        if let Some(id_param) = scalar_param(&row, 0) {
            out.insert(param_to_id(&id_param), scalar_param(&row, 1));
        }
    }
    Ok(out)
}

async fn compiled_schema_of(state: &AppState) -> Result<Arc<CompiledSchema>> {
    state.schema.current().await
}

// ---------------------------------------------------------------------------
// Links / pagination meta
// ---------------------------------------------------------------------------

fn build_pagination_meta(plan: &ReadPlan, total: Option<i64>, returned: usize, config: &AppConfig) -> jsonapi_response::document::DocumentMeta {
    let Some(pagination) = &plan.pagination else {
        return Default::default();
    };
    match pagination {
        PaginationPlan::Offset { limit, offset, .. } => {
            let page_meta = PageMeta::offset(total, *limit, *offset, returned);
            let page = Some(offset / limit.max(&1) + 1);
            jsonapi_response::document::DocumentMeta {
                pagination: Some(PaginationMeta::from_page_meta(&page_meta, config.effective_page_size(Some(*limit)), page, None)),
            }
        }
        PaginationPlan::Cursor { limit, .. } => {
            let has_more = returned as i64 >= *limit;
            let page_meta = PageMeta::cursor(has_more);
            jsonapi_response::document::DocumentMeta {
                pagination: Some(PaginationMeta::from_page_meta(&page_meta, config.effective_page_size(Some(*limit)), None, None)),
            }
        }
    }
}

fn build_collection_links(
    request: &ApiRequest,
    raw_query: &str,
    plan: &ReadPlan,
    total: Option<i64>,
    rows: &[Map<String, Value>],
) -> jsonapi_response::document::DocumentLinks {
    let base_path = request.path.as_str();
    let self_href = self_link(base_path, raw_query);

    let Some(pagination) = &plan.pagination else {
        return jsonapi_response::document::DocumentLinks { self_link: Some(self_href), ..Default::default() };
    };

    match pagination {
        PaginationPlan::Offset { limit, offset, .. } => {
            let page_number = offset / limit.max(&1) + 1;
            let first = with_page_params(base_path, raw_query, &[("page[number]", "1".to_string())]);
            let prev = if page_number > 1 {
                Some(with_page_params(base_path, raw_query, &[("page[number]", (page_number - 1).to_string())]))
            } else {
                None
            };
            let next = if (rows.len() as i64) == *limit {
                Some(with_page_params(base_path, raw_query, &[("page[number]", (page_number + 1).to_string())]))
            } else {
                None
            };
            let last = total.map(|t| {
                let last_page = ((t - 1) / limit.max(&1)) + 1;
                with_page_params(base_path, raw_query, &[("page[number]", last_page.to_string())])
            });
            jsonapi_response::document::DocumentLinks { self_link: Some(self_href), first: Some(first), prev, next, last }
        }
        PaginationPlan::Cursor { limit, .. } => {
            let next = if (rows.len() as i64) == *limit {
                rows.last().map(|row| {
                    let axes = cursor_axes(plan, row);
                    let cursor = Cursor::new(axes, true).encode();
                    with_page_params(base_path, raw_query, &[("page[after]", cursor)])
                })
            } else {
                None
            };
            jsonapi_response::document::DocumentLinks { self_link: Some(self_href), next, ..Default::default() }
        }
    }
}

fn cursor_axes(plan: &ReadPlan, row: &Map<String, Value>) -> Vec<CursorAxis> {
    if plan.sort.is_empty() {
        return plan
            .pk_columns
            .iter()
            .filter_map(|pk| row.get(pk).map(|v| CursorAxis { column: pk.clone(), value: scalar_to_string(v) }))
            .collect();
    }
    plan.sort
        .iter()
        .filter_map(|s| row.get(&s.column).map(|v| CursorAxis { column: s.column.clone(), value: scalar_to_string(v) }))
        .collect()
}

fn effective_url_prefix(config: &AppConfig) -> Option<&str> {
    if config.url_prefix.is_empty() {
        None
    } else {
        Some(config.url_prefix.as_str())
    }
}

// ---------------------------------------------------------------------------
// Row <-> JSON, PK helpers
// ---------------------------------------------------------------------------

fn primary_key_of(resource: &CompiledResource, row: &Map<String, Value>) -> String {
    resource
        .descriptor
        .pk_columns
        .iter()
        .map(|pk| row.get(pk).map(scalar_to_string).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(":")
}

/// `column = id` (or `col1 = a AND col2 = b` for a composite PK encoded as
/// `a:b`), matching the `primary_key_of`/`QueryBuilder` colon convention.
fn pk_predicate(pk_columns: &[String], id: &str) -> Expr {
    let parts: Vec<&str> = id.split(':').collect();
    let exprs: Vec<Expr> = pk_columns
        .iter()
        .zip(parts.iter().chain(std::iter::repeat(&"")))
        .map(|(col, part)| Expr::eq(col, part.to_string()))
        .collect();
    Expr::and_all(exprs)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_param(row: &PgRow, index: usize) -> Option<SqlParam> {
    use sqlx::ValueRef;
    let raw = row.try_get_raw(index).ok()?;
    if raw.is_null() {
        return None;
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Some(SqlParam::Int(v));
    }
    if let Ok(v) = row.try_get::<i32, _>(index) {
        return Some(SqlParam::Int(v as i64));
    }
    if let Ok(v) = row.try_get::<sqlx::types::Uuid, _>(index) {
        return Some(SqlParam::Uuid(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Some(SqlParam::Text(v));
    }
    None
}

fn param_to_id(param: &SqlParam) -> String {
    match param {
        SqlParam::Text(s) => s.clone(),
        SqlParam::Int(n) => n.to_string(),
        SqlParam::Uuid(u) => u.to_string(),
        other => format!("{other:?}"),
    }
}

/// Decode one sqlx row into a JSON object keyed by column name, using the
/// Postgres type name to pick the right native decode — the JSON:API layer
/// never sees a `sqlx::postgres::PgRow` past this boundary.
fn row_to_map(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();

    for column in row.columns() {
        let name = column.name();
        let type_name = column.type_info().name();

        let value = match type_name {
            "INT2" | "SMALLINT" => row.try_get::<i16, _>(name).ok().map(|v| Value::Number(v.into())),
            "INT4" | "INT" | "INTEGER" => row.try_get::<i32, _>(name).ok().map(|v| Value::Number(v.into())),
            "INT8" | "BIGINT" => row.try_get::<i64, _>(name).ok().map(|v| Value::Number(v.into())),
            "FLOAT4" | "REAL" => row
                .try_get::<f32, _>(name)
                .ok()
                .and_then(|v| serde_json::Number::from_f64(v as f64))
                .map(Value::Number),
            "FLOAT8" | "DOUBLE PRECISION" => row.try_get::<f64, _>(name).ok().and_then(serde_json::Number::from_f64).map(Value::Number),
            "NUMERIC" | "DECIMAL" => row
                .try_get::<sqlx::types::BigDecimal, _>(name)
                .ok()
                .map(|v| Value::String(v.to_string())),
            "BOOL" | "BOOLEAN" => row.try_get::<bool, _>(name).ok().map(Value::Bool),
            "JSON" | "JSONB" => row.try_get::<Value, _>(name).ok(),
            "UUID" => row.try_get::<sqlx::types::Uuid, _>(name).ok().map(|v| Value::String(v.to_string())),
            "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(name)
                .ok()
                .map(|v| Value::String(v.to_rfc3339())),
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => row.try_get::<chrono::NaiveDateTime, _>(name).ok().map(|v| Value::String(v.to_string())),
            "DATE" => row.try_get::<chrono::NaiveDate, _>(name).ok().map(|v| Value::String(v.to_string())),
            "TIME" | "TIME WITHOUT TIME ZONE" => row.try_get::<chrono::NaiveTime, _>(name).ok().map(|v| Value::String(v.to_string())),
            _ => row.try_get::<String, _>(name).ok().map(Value::String),
        };

        map.insert(name.to_string(), value.unwrap_or(Value::Null));
    }

    map
}

// ---------------------------------------------------------------------------
// SQL execution: binds a fragment's parameters and runs it.
// ---------------------------------------------------------------------------

async fn fetch_all_fragment<'e, E>(executor: E, frag: &SqlFragment) -> Result<Vec<PgRow>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query(frag.sql());
    for param in frag.params() {
        query = bind_param(query, param);
    }
    query.fetch_all(executor).await.map_err(map_sqlx_error)
}

async fn fetch_optional_fragment<'e, E>(executor: E, frag: &SqlFragment) -> Result<Option<PgRow>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query(frag.sql());
    for param in frag.params() {
        query = bind_param(query, param);
    }
    query.fetch_optional(executor).await.map_err(map_sqlx_error)
}

async fn fetch_one_fragment<'e, E>(executor: E, frag: &SqlFragment) -> Result<PgRow>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query(frag.sql());
    for param in frag.params() {
        query = bind_param(query, param);
    }
    query.fetch_one(executor).await.map_err(map_sqlx_error)
}

async fn execute_fragment<'e, E>(executor: E, frag: &SqlFragment) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query(frag.sql());
    for param in frag.params() {
        query = bind_param(query, param);
    }
    let result = query.execute(executor).await.map_err(map_sqlx_error)?;
    Ok(result.rows_affected())
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    param: &'q SqlParam,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    match param {
        SqlParam::Null => query.bind(Option::<String>::None),
        SqlParam::Bool(b) => query.bind(*b),
        SqlParam::Int(n) => query.bind(*n),
        SqlParam::Float(f) => query.bind(*f),
        SqlParam::Text(s) => query.bind(s),
        SqlParam::Bytes(b) => query.bind(b.as_slice()),
        SqlParam::Json(v) => query.bind(v),
        SqlParam::Uuid(u) => query.bind(*u),
        SqlParam::Timestamp(t) => query.bind(*t),
        SqlParam::Array(items) => bind_array(query, items),
    }
}

fn bind_array<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    items: &'q [SqlParam],
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    if items.iter().all(|p| matches!(p, SqlParam::Int(_))) {
        let values: Vec<i64> = items
            .iter()
            .map(|p| match p {
                SqlParam::Int(n) => *n,
                _ => unreachable!(),
            })
            .collect();
        query.bind(values)
    } else if items.iter().all(|p| matches!(p, SqlParam::Bool(_))) {
        let values: Vec<bool> = items
            .iter()
            .map(|p| match p {
                SqlParam::Bool(b) => *b,
                _ => unreachable!(),
            })
            .collect();
        query.bind(values)
    } else {
        let values: Vec<String> = items.iter().map(param_to_id).collect();
        query.bind(values)
    }
}

/// Map a driver error to the taxonomy, downcasting to `PgDatabaseError` for
/// the detail/hint/constraint fields when available.
fn map_sqlx_error(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::RowNotFound => Error::NotFound("row not found".into()),
        sqlx::Error::Database(db_err) => {
            let (details, hint) = db_err
                .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                .map(|pg_err| (pg_err.detail().map(String::from), pg_err.hint().map(String::from)))
                .unwrap_or((None, None));

            Error::Database(DatabaseError {
                code: db_err.code().map(|c| c.to_string()).unwrap_or_default(),
                message: db_err.message().to_string(),
                details,
                hint,
                constraint: db_err.constraint().map(|s| s.to_string()),
                table: db_err.table().map(|s| s.to_string()),
                column: None,
            })
        }
        other => Error::Internal(other.to_string()),
    }
}

fn into_axum_response(response: ApiResponse) -> AxumResponse {
    let mut builder = AxumResponse::builder().status(response.status);
    for (key, value) in response.headers.iter() {
        builder = builder.header(key, value);
    }
    builder.body(Body::from(response.body)).unwrap_or_else(|_| AxumResponse::new(Body::empty()))
}
