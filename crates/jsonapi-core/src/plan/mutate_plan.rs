//! Mutation (INSERT/UPDATE/UPSERT/DELETE) planning, including the
//! relationship linkage writes that ride along with a resource write.

use crate::error::{Error, Result, ValidationFailure};
use crate::request::{RelationshipObject, ResourceIdentifier, ResourceObject};
use crate::schema::{CompiledResource, CompiledSchema, FieldDescriptor, FieldType, RelationshipKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A column/value pair ready for an INSERT or UPDATE statement.
pub type ColumnValue = (String, serde_json::Value);

/// A relationship linkage write that must run after the primary row has
/// been written (it needs the row's id, a many-to-many join row, or both).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RelationshipWrite {
    /// `hasOne` — set the target row's foreign key to this row's id (or clear it).
    ReplaceHasOne { target_type: String, foreign_key: String, id: Option<String> },
    /// `hasMany` — repoint every listed target row's foreign key to this row,
    /// clearing it on rows previously pointing here but no longer listed.
    ReplaceHasMany { target_type: String, foreign_key: String, ids: Vec<String> },
    /// `hasMany` polymorphic — same as above plus the discriminator column.
    ReplaceHasManyPolymorphic {
        target_type: String,
        foreign_key: String,
        foreign_type_column: String,
        discriminant: String,
        ids: Vec<String>,
    },
    /// `manyToMany` — replace this row's join-table rows wholesale.
    ReplaceManyToMany {
        join_table: crate::request::QualifiedIdentifier,
        source_fk: String,
        target_fk: String,
        ids: Vec<String>,
    },
}

/// A mutation plan for a single primary resource.
#[derive(Clone, Debug)]
pub enum MutatePlan {
    Create {
        type_name: String,
        table: crate::request::QualifiedIdentifier,
        columns: Vec<ColumnValue>,
        relationship_writes: Vec<RelationshipWrite>,
    },
    Update {
        type_name: String,
        table: crate::request::QualifiedIdentifier,
        id: String,
        pk_columns: Vec<String>,
        columns: Vec<ColumnValue>,
        relationship_writes: Vec<RelationshipWrite>,
    },
    /// `PUT` — create-path semantics mirror `Create` with the client-supplied
    /// id; replace-path semantics run a many-to-many cascade delete before
    /// reapplying linkage, same as `Delete` followed by `Create`.
    Upsert {
        type_name: String,
        table: crate::request::QualifiedIdentifier,
        id: String,
        pk_columns: Vec<String>,
        columns: Vec<ColumnValue>,
        relationship_writes: Vec<RelationshipWrite>,
    },
    Delete {
        type_name: String,
        table: crate::request::QualifiedIdentifier,
        id: String,
        pk_columns: Vec<String>,
        /// `(join_table, source_fk)` pairs to clear before deleting the row itself.
        cascade_many_to_many: Vec<(crate::request::QualifiedIdentifier, String)>,
    },
}

impl MutatePlan {
    pub fn create(resource: &CompiledResource, schema: &CompiledSchema, body: &ResourceObject) -> Result<Self> {
        if !resource.descriptor.insertable {
            return Err(Error::Forbidden(format!("'{}' does not support creation", resource.descriptor.type_name)));
        }
        let (mut columns, relationship_writes) = resolve_write(resource, schema, body, WriteMode::Create)?;
        if let Some(id) = &body.id {
            columns.push((resource.descriptor.pk_columns[0].clone(), serde_json::Value::String(id.clone())));
        }
        Ok(Self::Create {
            type_name: resource.descriptor.type_name.clone(),
            table: resource.descriptor.table.clone(),
            columns,
            relationship_writes,
        })
    }

    pub fn update(resource: &CompiledResource, schema: &CompiledSchema, id: &str, body: &ResourceObject) -> Result<Self> {
        if !resource.descriptor.updatable {
            return Err(Error::Forbidden(format!("'{}' does not support updates", resource.descriptor.type_name)));
        }
        let (columns, relationship_writes) = resolve_write(resource, schema, body, WriteMode::Update)?;
        Ok(Self::Update {
            type_name: resource.descriptor.type_name.clone(),
            table: resource.descriptor.table.clone(),
            id: id.to_string(),
            pk_columns: resource.descriptor.pk_columns.clone(),
            columns,
            relationship_writes,
        })
    }

    /// `PUT` always upserts: the create path mirrors `create`, the replace
    /// path runs `delete`'s many-to-many cascade before reapplying linkage.
    pub fn upsert(resource: &CompiledResource, schema: &CompiledSchema, id: &str, body: &ResourceObject) -> Result<Self> {
        if !resource.descriptor.insertable && !resource.descriptor.updatable {
            return Err(Error::Forbidden(format!("'{}' does not support upsert", resource.descriptor.type_name)));
        }
        // PUT replaces the whole resource, so a missing required attribute is
        // just as invalid as it would be on create.
        let (columns, relationship_writes) = resolve_write(resource, schema, body, WriteMode::Create)?;
        Ok(Self::Upsert {
            type_name: resource.descriptor.type_name.clone(),
            table: resource.descriptor.table.clone(),
            id: id.to_string(),
            pk_columns: resource.descriptor.pk_columns.clone(),
            columns,
            relationship_writes,
        })
    }

    pub fn delete(resource: &CompiledResource, id: &str) -> Result<Self> {
        if !resource.descriptor.deletable {
            return Err(Error::Forbidden(format!("'{}' does not support deletion", resource.descriptor.type_name)));
        }
        let cascade_many_to_many = resource
            .descriptor
            .relationships
            .iter()
            .filter_map(|r| match &r.kind {
                RelationshipKind::ManyToMany { join_table, source_fk, .. } => Some((join_table.clone(), source_fk.clone())),
                _ => None,
            })
            .collect();
        Ok(Self::Delete {
            type_name: resource.descriptor.type_name.clone(),
            table: resource.descriptor.table.clone(),
            id: id.to_string(),
            pk_columns: resource.descriptor.pk_columns.clone(),
            cascade_many_to_many,
        })
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Create { type_name, .. }
            | Self::Update { type_name, .. }
            | Self::Upsert { type_name, .. }
            | Self::Delete { type_name, .. } => type_name,
        }
    }
}

/// Whether a write is creating a brand new row (so missing required fields
/// are violations) or patching an existing one (so absence just means
/// "leave it alone").
#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Create,
    Update,
}

/// Validate attributes against the resource's writable fields and split
/// relationship linkage into inline foreign-key columns (for `belongsTo`)
/// versus deferred [`RelationshipWrite`]s (everything else).
fn resolve_write(
    resource: &CompiledResource,
    schema: &CompiledSchema,
    body: &ResourceObject,
    mode: WriteMode,
) -> Result<(Vec<ColumnValue>, Vec<RelationshipWrite>)> {
    let mut columns = resolve_attributes(resource, &body.attributes, mode)?;
    let mut writes = Vec::new();

    for (rel_name, rel_obj) in &body.relationships {
        let rel = resource
            .relationship(rel_name)
            .ok_or_else(|| Error::Validation(vec![crate::error::ValidationFailure::relationship(
                rel_name,
                "unknown relationship",
            )]))?;

        match (&rel.kind, rel_obj) {
            (RelationshipKind::BelongsTo { foreign_key, target_type }, RelationshipObject::ToOne { data }) => {
                validate_identifier_type(data.as_ref(), target_type)?;
                let value = match data {
                    Some(identifier) => serde_json::Value::String(identifier.id.clone()),
                    None => serde_json::Value::Null,
                };
                columns.push((foreign_key.clone(), value));
            }
            (RelationshipKind::HasOne { foreign_key, target_type }, RelationshipObject::ToOne { data }) => {
                validate_identifier_type(data.as_ref(), target_type)?;
                writes.push(RelationshipWrite::ReplaceHasOne {
                    target_type: target_type.clone(),
                    foreign_key: foreign_key.clone(),
                    id: data.as_ref().map(|i| i.id.clone()),
                });
            }
            (RelationshipKind::HasMany { foreign_key, target_type }, RelationshipObject::ToMany { data }) => {
                validate_identifiers_type(data, target_type)?;
                writes.push(RelationshipWrite::ReplaceHasMany {
                    target_type: target_type.clone(),
                    foreign_key: foreign_key.clone(),
                    ids: data.iter().map(|i| i.id.clone()).collect(),
                });
            }
            (
                RelationshipKind::HasManyPolymorphic { foreign_key, foreign_type_column, discriminant, target_types },
                RelationshipObject::ToMany { data },
            ) => {
                for identifier in data {
                    if !target_types.iter().any(|t| t == &identifier.type_name) {
                        return Err(Error::Conflict(format!(
                            "'{}' is not a valid target type for relationship '{rel_name}'",
                            identifier.type_name
                        )));
                    }
                }
                writes.push(RelationshipWrite::ReplaceHasManyPolymorphic {
                    target_type: target_types.first().cloned().unwrap_or_default(),
                    foreign_key: foreign_key.clone(),
                    foreign_type_column: foreign_type_column.clone(),
                    discriminant: discriminant.clone(),
                    ids: data.iter().map(|i| i.id.clone()).collect(),
                });
            }
            (RelationshipKind::ManyToMany { join_table, source_fk, target_fk, target_type, .. }, RelationshipObject::ToMany { data }) => {
                validate_identifiers_type(data, target_type)?;
                writes.push(RelationshipWrite::ReplaceManyToMany {
                    join_table: join_table.clone(),
                    source_fk: source_fk.clone(),
                    target_fk: target_fk.clone(),
                    ids: data.iter().map(|i| i.id.clone()).collect(),
                });
            }
            _ => {
                return Err(Error::Conflict(format!(
                    "relationship '{rel_name}' linkage shape does not match its cardinality"
                )));
            }
        }
    }

    let _ = schema;
    Ok((columns, writes))
}

/// Validate every attribute in the body against its [`FieldDescriptor`],
/// collecting every violation rather than stopping at the first one, then
/// (on create) fill in `defaultTo` values and flag any still-missing
/// required field.
fn resolve_attributes(
    resource: &CompiledResource,
    attributes: &serde_json::Map<String, Value>,
    mode: WriteMode,
) -> Result<Vec<ColumnValue>> {
    let mut columns = Vec::new();
    let mut failures = Vec::new();

    for (name, value) in attributes {
        let Some(field) = resource.field(name) else {
            failures.push(ValidationFailure::new(name, "unknown attribute"));
            continue;
        };
        if field.is_computed() {
            failures.push(ValidationFailure::new(name, "computed attributes cannot be written"));
            continue;
        }
        if field.read_only {
            failures.push(ValidationFailure::new(name, "attribute is read-only"));
            continue;
        }
        match validate_value(field, value) {
            Ok(()) => columns.push((field.column.clone(), value.clone())),
            Err(detail) => failures.push(ValidationFailure::new(name, detail)),
        }
    }

    if mode == WriteMode::Create {
        for field in &resource.descriptor.fields {
            if field.is_computed() || field.read_only || attributes.contains_key(&field.name) {
                continue;
            }
            match &field.default_to {
                Some(default) => columns.push((field.column.clone(), default.clone())),
                None if field.required => failures.push(ValidationFailure::new(&field.name, "is required")),
                None => {}
            }
        }
    }

    if !failures.is_empty() {
        return Err(Error::Validation(failures));
    }
    Ok(columns)
}

/// Check one attribute value against its field's type and constraints.
/// Returns `Err(detail)` describing the first violated constraint — a field
/// either fully validates or reports one reason, unlike the attribute-level
/// pass which collects across fields.
fn validate_value(field: &FieldDescriptor, value: &Value) -> std::result::Result<(), String> {
    if value.is_null() {
        return if field.nullable { Ok(()) } else { Err("must not be null".into()) };
    }

    if !type_matches(field.field_type, value) {
        return Err(format!("must be of type {}", type_name(field.field_type)));
    }

    if let Some(enum_values) = &field.enum_values {
        if let Some(s) = value.as_str() {
            if !enum_values.iter().any(|v| v == s) {
                return Err(format!("must be one of: {}", enum_values.join(", ")));
            }
        }
    }

    if let Some(max_length) = field.max_length {
        if let Some(s) = value.as_str() {
            if s.chars().count() > max_length {
                return Err(format!("must be at most {max_length} characters"));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = field.min {
            if n < min {
                return Err(format!("must be >= {min}"));
            }
        }
        if let Some(max) = field.max {
            if n > max {
                return Err(format!("must be <= {max}"));
            }
        }
    }

    Ok(())
}

fn type_matches(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String | FieldType::Date | FieldType::DateTime | FieldType::Time | FieldType::Timestamp | FieldType::Blob | FieldType::File => {
            value.is_string()
        }
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Id => value.is_string() || value.is_number(),
        FieldType::Json => true,
        FieldType::Array => value.is_array(),
    }
}

fn type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Number => "number",
        FieldType::Boolean => "boolean",
        FieldType::Date => "date",
        FieldType::DateTime => "datetime",
        FieldType::Time => "time",
        FieldType::Timestamp => "timestamp",
        FieldType::Id => "id",
        FieldType::Blob => "blob",
        FieldType::Json => "json",
        FieldType::Array => "array",
        FieldType::File => "file",
    }
}

fn validate_identifier_type(identifier: Option<&ResourceIdentifier>, expected_type: &str) -> Result<()> {
    if let Some(identifier) = identifier {
        if identifier.type_name != expected_type {
            return Err(Error::Conflict(format!(
                "expected relationship linkage type '{expected_type}', got '{}'",
                identifier.type_name
            )));
        }
    }
    Ok(())
}

fn validate_identifiers_type(identifiers: &[ResourceIdentifier], expected_type: &str) -> Result<()> {
    for identifier in identifiers {
        validate_identifier_type(Some(identifier), expected_type)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{compile, FieldDescriptor, RelationshipDescriptor, ResourceDescriptor};

    fn schema_with_belongs_to() -> CompiledSchema {
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: crate::request::QualifiedIdentifier::new("public", "articles"),
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
            table: crate::request::QualifiedIdentifier::new("public", "people"),
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

    fn body_with_title_and_author(title: &str, author_id: &str) -> ResourceObject {
        let mut attributes = serde_json::Map::new();
        attributes.insert("title".into(), serde_json::json!(title));
        let mut relationships = IndexMap::new();
        relationships.insert(
            "author".to_string(),
            RelationshipObject::ToOne {
                data: Some(ResourceIdentifier { type_name: "people".into(), id: author_id.into() }),
            },
        );
        ResourceObject { type_name: "articles".into(), id: None, attributes, relationships }
    }

    #[test]
    fn test_create_plan_inlines_belongs_to_fk() {
        let schema = schema_with_belongs_to();
        let resource = schema.require("articles").unwrap();
        let body = body_with_title_and_author("Hello", "7");
        let plan = MutatePlan::create(resource, &schema, &body).unwrap();
        match plan {
            MutatePlan::Create { columns, relationship_writes, .. } => {
                assert!(relationship_writes.is_empty());
                assert!(columns.iter().any(|(c, v)| c == "author_id" && v == &serde_json::json!("7")));
            }
            _ => panic!("expected Create"),
        }
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let schema = schema_with_belongs_to();
        let resource = schema.require("articles").unwrap();
        let mut attributes = serde_json::Map::new();
        attributes.insert("bogus".into(), serde_json::json!("x"));
        let body = ResourceObject { type_name: "articles".into(), id: None, attributes, relationships: IndexMap::new() };
        assert!(MutatePlan::create(resource, &schema, &body).is_err());
    }

    #[test]
    fn test_relationship_type_mismatch_rejected() {
        let schema = schema_with_belongs_to();
        let resource = schema.require("articles").unwrap();
        let mut relationships = IndexMap::new();
        relationships.insert(
            "author".to_string(),
            RelationshipObject::ToOne { data: Some(ResourceIdentifier { type_name: "articles".into(), id: "1".into() }) },
        );
        let body = ResourceObject {
            type_name: "articles".into(),
            id: None,
            attributes: serde_json::Map::new(),
            relationships,
        };
        assert!(MutatePlan::create(resource, &schema, &body).is_err());
    }

    #[test]
    fn test_delete_plan_collects_many_to_many_cascades() {
        let schema = schema_with_belongs_to();
        let resource = schema.require("articles").unwrap();
        let plan = MutatePlan::delete(resource, "1").unwrap();
        match plan {
            MutatePlan::Delete { cascade_many_to_many, .. } => assert!(cascade_many_to_many.is_empty()),
            _ => panic!("expected Delete"),
        }
    }
}
