//! JSON:API document assembly: `{data, included, links, meta}` on success,
//! `{errors}` on failure.

use indexmap::IndexMap;
use jsonapi_core::error::JsonApiError;
use jsonapi_core::schema::{CompiledResource, Hidden, RelationshipKind};
use jsonapi_core::PageMeta;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One `{type, id}` resource identifier, as it appears in relationship
/// linkage and `data`/`included`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
}

/// Resource linkage: present for `belongsTo`/`hasOne` even when empty
/// (`null`), present for `hasMany`/`manyToMany` only when the relationship
/// was eager-loaded via `include` — otherwise the relationship object
/// carries only `links`, which is valid per the JSON:API linkage rules.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    ToOne(Option<ResourceIdentifier>),
    ToMany(Vec<ResourceIdentifier>),
}

#[derive(Clone, Debug, Serialize)]
pub struct RelationshipLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub related: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RelationshipObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<RelationshipLinks>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SelfLink {
    #[serde(rename = "self")]
    pub self_link: String,
}

/// One resource object under `data` or `included`.
#[derive(Clone, Debug, Serialize)]
pub struct ResourceDocument {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RelationshipObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<SelfLink>,
}

/// Already-resolved relationship linkage (built from eager-loaded rows),
/// keyed by relationship name, overriding the default inline-FK-only
/// linkage `resource_object` would otherwise produce.
pub type EagerLinkage = HashMap<String, Linkage>;

/// Build one `data`/`included` member from a raw projected row.
///
/// `row` is keyed by the field's `name` (the `ReadPlan` select output), plus
/// a synthetic `__fk_<relationship>` column per `belongsTo` relationship —
/// see `jsonapi_core::plan::read_plan`'s `select_columns`. `url_prefix`, if
/// set, produces `links.self` and per-relationship `links.self`/`related`.
pub fn resource_object(
    resource: &CompiledResource,
    row: &Map<String, Value>,
    eager: Option<&EagerLinkage>,
    url_prefix: Option<&str>,
) -> ResourceDocument {
    let id = primary_key_value(resource, row);

    let mut attributes = Map::new();
    for field in &resource.descriptor.fields {
        if field.hidden == Hidden::Always {
            continue;
        }
        if let Some(value) = row.get(&field.name) {
            attributes.insert(field.name.clone(), value.clone());
        }
    }

    let mut relationships = IndexMap::new();
    for rel in &resource.descriptor.relationships {
        let data = eager
            .and_then(|e| e.get(&rel.name))
            .cloned()
            .or_else(|| default_linkage(resource, rel, row));

        let links = url_prefix.map(|prefix| RelationshipLinks {
            self_link: format!("{prefix}/{}/{}/relationships/{}", resource.descriptor.type_name, id, rel.name),
            related: format!("{prefix}/{}/{}/{}", resource.descriptor.type_name, id, rel.name),
        });

        if data.is_some() || links.is_some() {
            relationships.insert(rel.name.clone(), RelationshipObject { data, links });
        }
    }

    let links = url_prefix.map(|prefix| SelfLink {
        self_link: format!("{prefix}/{}/{}", resource.descriptor.type_name, id),
    });

    ResourceDocument { type_name: resource.descriptor.type_name.clone(), id, attributes, relationships, links }
}

/// `belongsTo` linkage is always cheap to produce inline from the
/// synthetic `__fk_<rel>` column the planner projects; every other
/// cardinality needs the child rows from an `include` to resolve, so it's
/// left to `eager` and otherwise omitted (link-only relationship object).
fn default_linkage(resource: &CompiledResource, rel: &jsonapi_core::schema::RelationshipDescriptor, row: &Map<String, Value>) -> Option<Linkage> {
    let _ = resource;
    match &rel.kind {
        RelationshipKind::BelongsTo { target_type, .. } => {
            let key = format!("__fk_{}", rel.name);
            let value = row.get(&key)?;
            if value.is_null() {
                return Some(Linkage::ToOne(None));
            }
            Some(Linkage::ToOne(Some(ResourceIdentifier {
                type_name: target_type.clone(),
                id: scalar_to_id(value),
            })))
        }
        RelationshipKind::BelongsToPolymorphic { .. } => {
            let id = row.get(&format!("__fk_{}", rel.name))?;
            if id.is_null() {
                return Some(Linkage::ToOne(None));
            }
            let type_name = row.get(&format!("__fktype_{}", rel.name)).map(scalar_to_id)?;
            Some(Linkage::ToOne(Some(ResourceIdentifier { type_name, id: scalar_to_id(id) })))
        }
        _ => None,
    }
}

fn primary_key_value(resource: &CompiledResource, row: &Map<String, Value>) -> String {
    let parts: Vec<String> = resource
        .descriptor
        .pk_columns
        .iter()
        .map(|pk| row.get(pk).map(scalar_to_id).unwrap_or_default())
        .collect();
    parts.join(":")
}

fn scalar_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Top-level `links` for a collection response.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DocumentLinks {
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CursorMeta {
    pub next: Option<String>,
}

/// The `meta.pagination` object attached to a paginated collection response.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PaginationMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorMeta>,
}

impl PaginationMeta {
    pub fn from_page_meta(meta: &PageMeta, page_size: i64, page: Option<i64>, next_cursor: Option<String>) -> Self {
        Self {
            page,
            page_size,
            page_count: meta.page_count,
            total: meta.total,
            has_more: meta.has_more,
            cursor: next_cursor.map(|next| CursorMeta { next: Some(next) }),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DocumentMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

/// `data` is either a single resource, a collection, or `null` (a to-one
/// relationship/related fetch that resolved to nothing).
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Option<ResourceDocument>),
    Many(Vec<ResourceDocument>),
}

/// A complete success document.
#[derive(Clone, Debug, Serialize)]
pub struct JsonApiDocument {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceDocument>,
    #[serde(skip_serializing_if = "is_default_links")]
    pub links: DocumentLinks,
    #[serde(skip_serializing_if = "is_default_meta")]
    pub meta: DocumentMeta,
}

fn is_default_links(links: &DocumentLinks) -> bool {
    links.self_link.is_none() && links.first.is_none() && links.prev.is_none() && links.next.is_none() && links.last.is_none()
}

fn is_default_meta(meta: &DocumentMeta) -> bool {
    meta.pagination.is_none()
}

impl JsonApiDocument {
    /// Build a document, deduplicating `included` by `(type, id)` — the
    /// same related resource reached through two different include paths
    /// (or shared by two primary resources) must appear only once.
    pub fn new(data: PrimaryData, included: Vec<ResourceDocument>, links: DocumentLinks, meta: DocumentMeta) -> Self {
        let mut seen = std::collections::HashSet::new();
        let included = included
            .into_iter()
            .filter(|doc| seen.insert((doc.type_name.clone(), doc.id.clone())))
            .collect();
        Self { data, included, links, meta }
    }
}

/// A `{errors: [...]}` document.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorDocument {
    pub errors: Vec<JsonApiError>,
}

impl From<&jsonapi_core::error::Error> for ErrorDocument {
    fn from(error: &jsonapi_core::error::Error) -> Self {
        Self { errors: error.to_jsonapi_errors() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonapi_core::request::QualifiedIdentifier;
    use jsonapi_core::schema::{compile, FieldDescriptor, RelationshipDescriptor, ResourceDescriptor};

    fn schema() -> jsonapi_core::schema::CompiledSchema {
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("title", "title")],
            relationships: vec![RelationshipDescriptor {
                name: "author".into(),
                kind: RelationshipKind::BelongsTo { foreign_key: "author_id".into(), target_type: "people".into() },
            }],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let people = ResourceDescriptor {
            type_name: "people".into(),
            table: QualifiedIdentifier::new("public", "people"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("name", "name")],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        compile(vec![articles, people]).unwrap()
    }

    #[test]
    fn test_resource_object_inlines_belongs_to_linkage() {
        let schema = schema();
        let resource = schema.get("articles").unwrap();
        let mut row = Map::new();
        row.insert("id".into(), serde_json::json!("1"));
        row.insert("title".into(), serde_json::json!("Hello"));
        row.insert("__fk_author".into(), serde_json::json!("9"));

        let doc = resource_object(resource, &row, None, None);
        assert_eq!(doc.id, "1");
        assert_eq!(doc.attributes.get("title").unwrap(), "Hello");
        match doc.relationships.get("author").unwrap().data.as_ref().unwrap() {
            Linkage::ToOne(Some(identifier)) => {
                assert_eq!(identifier.type_name, "people");
                assert_eq!(identifier.id, "9");
            }
            other => panic!("expected ToOne linkage, got {other:?}"),
        }
    }

    #[test]
    fn test_resource_object_null_belongs_to() {
        let schema = schema();
        let resource = schema.get("articles").unwrap();
        let mut row = Map::new();
        row.insert("id".into(), serde_json::json!("1"));
        row.insert("title".into(), serde_json::json!("Hello"));
        row.insert("__fk_author".into(), Value::Null);

        let doc = resource_object(resource, &row, None, None);
        assert!(matches!(doc.relationships.get("author").unwrap().data, Some(Linkage::ToOne(None))));
    }

    #[test]
    fn test_included_deduplicates_by_type_and_id() {
        let dup = ResourceDocument {
            type_name: "people".into(),
            id: "9".into(),
            attributes: Map::new(),
            relationships: IndexMap::new(),
            links: None,
        };
        let doc = JsonApiDocument::new(
            PrimaryData::Many(vec![]),
            vec![dup.clone(), dup],
            DocumentLinks::default(),
            DocumentMeta::default(),
        );
        assert_eq!(doc.included.len(), 1);
    }
}
