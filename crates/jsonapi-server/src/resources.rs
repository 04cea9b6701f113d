//! Declarative resource descriptors, compiled once at startup.
//!
//! This is the install-time equivalent of a migration file: every exposed
//! table, its writable fields, and its relationships are named here rather
//! than introspected from the database, so the schema compiler can enforce
//! every structural invariant (cycle-free computed fields, unique
//! many-to-many inverses, ...) before the first request ever arrives.

use indexmap::IndexMap;
use jsonapi_core::request::QualifiedIdentifier;
use jsonapi_core::schema::{
    ApplyFilter, FieldDescriptor, FieldType, RelationshipDescriptor, RelationshipKind, ResourceDescriptor,
    SearchDescriptor, SearchFieldDescriptor, SearchTarget,
};

/// The demo resource graph this server exposes: articles and videos (both
/// commentable), posts, their authors, and a many-to-many tag taxonomy.
pub fn descriptors() -> Vec<ResourceDescriptor> {
    vec![people(), articles(), posts(), videos(), comments(), tags()]
}

fn people() -> ResourceDescriptor {
    ResourceDescriptor {
        type_name: "people".into(),
        table: QualifiedIdentifier::new("public", "people"),
        pk_columns: vec!["id".into()],
        fields: vec![
            FieldDescriptor { required: true, max_length: Some(120), ..FieldDescriptor::stored("name", "name") },
            FieldDescriptor { indexed: true, unique: true, ..FieldDescriptor::stored("email", "email") },
            FieldDescriptor { field_type: FieldType::Timestamp, read_only: true, ..FieldDescriptor::stored("created_at", "created_at") },
        ],
        relationships: vec![
            RelationshipDescriptor {
                name: "articles".into(),
                kind: RelationshipKind::HasMany { target_type: "articles".into(), foreign_key: "author_id".into() },
            },
            RelationshipDescriptor {
                name: "posts".into(),
                kind: RelationshipKind::HasMany { target_type: "posts".into(), foreign_key: "author_id".into() },
            },
            RelationshipDescriptor {
                name: "videos".into(),
                kind: RelationshipKind::HasMany { target_type: "videos".into(), foreign_key: "author_id".into() },
            },
            RelationshipDescriptor {
                name: "comments".into(),
                kind: RelationshipKind::HasMany { target_type: "comments".into(), foreign_key: "author_id".into() },
            },
        ],
        search: Some(SearchDescriptor { columns: vec!["name".into(), "email".into()], fields: IndexMap::new() }),
        insertable: true,
        updatable: true,
        deletable: true,
    }
}

fn articles() -> ResourceDescriptor {
    ResourceDescriptor {
        type_name: "articles".into(),
        table: QualifiedIdentifier::new("public", "articles"),
        pk_columns: vec!["id".into()],
        fields: vec![
            FieldDescriptor { required: true, max_length: Some(200), indexed: true, ..FieldDescriptor::stored("title", "title") },
            FieldDescriptor { field_type: FieldType::String, nullable: true, ..FieldDescriptor::stored("body", "body") },
            FieldDescriptor {
                field_type: FieldType::String,
                default_to: Some(serde_json::json!("draft")),
                enum_values: Some(vec!["draft".into(), "published".into(), "archived".into()]),
                indexed: true,
                ..FieldDescriptor::stored("status", "status")
            },
            FieldDescriptor { field_type: FieldType::Timestamp, read_only: true, ..FieldDescriptor::stored("created_at", "created_at") },
        ],
        relationships: vec![
            RelationshipDescriptor {
                name: "author".into(),
                kind: RelationshipKind::BelongsTo { foreign_key: "author_id".into(), target_type: "people".into() },
            },
            RelationshipDescriptor {
                name: "tags".into(),
                kind: RelationshipKind::ManyToMany {
                    join_table: QualifiedIdentifier::new("public", "articles_tags"),
                    source_fk: "article_id".into(),
                    target_fk: "tag_id".into(),
                    target_type: "tags".into(),
                    inverse_name: "articles".into(),
                },
            },
        ],
        search: Some(SearchDescriptor {
            columns: vec!["title".into(), "body".into()],
            fields: {
                let mut fields = IndexMap::new();
                fields.insert(
                    "authorName".to_string(),
                    SearchFieldDescriptor {
                        target: SearchTarget::ActualField(vec!["author".into(), "name".into()]),
                        apply_filter: None,
                    },
                );
                fields
            },
        }),
        insertable: true,
        updatable: true,
        deletable: true,
    }
}

fn posts() -> ResourceDescriptor {
    ResourceDescriptor {
        type_name: "posts".into(),
        table: QualifiedIdentifier::new("public", "posts"),
        pk_columns: vec!["id".into()],
        fields: vec![
            FieldDescriptor { required: true, max_length: Some(200), indexed: true, ..FieldDescriptor::stored("title", "title") },
            FieldDescriptor { field_type: FieldType::String, nullable: true, ..FieldDescriptor::stored("body", "body") },
            FieldDescriptor { field_type: FieldType::Timestamp, read_only: true, ..FieldDescriptor::stored("created_at", "created_at") },
        ],
        relationships: vec![RelationshipDescriptor {
            name: "author".into(),
            kind: RelationshipKind::BelongsTo { foreign_key: "author_id".into(), target_type: "people".into() },
        }],
        search: Some(SearchDescriptor { columns: vec!["title".into()], fields: IndexMap::new() }),
        insertable: true,
        updatable: true,
        deletable: true,
    }
}

fn videos() -> ResourceDescriptor {
    ResourceDescriptor {
        type_name: "videos".into(),
        table: QualifiedIdentifier::new("public", "videos"),
        pk_columns: vec!["id".into()],
        fields: vec![
            FieldDescriptor { required: true, max_length: Some(200), indexed: true, ..FieldDescriptor::stored("title", "title") },
            FieldDescriptor { required: true, ..FieldDescriptor::stored("url", "url") },
            FieldDescriptor { field_type: FieldType::Timestamp, read_only: true, ..FieldDescriptor::stored("created_at", "created_at") },
        ],
        relationships: vec![RelationshipDescriptor {
            name: "author".into(),
            kind: RelationshipKind::BelongsTo { foreign_key: "author_id".into(), target_type: "people".into() },
        }],
        search: Some(SearchDescriptor { columns: vec!["title".into()], fields: IndexMap::new() }),
        insertable: true,
        updatable: true,
        deletable: true,
    }
}

fn comments() -> ResourceDescriptor {
    ResourceDescriptor {
        type_name: "comments".into(),
        table: QualifiedIdentifier::new("public", "comments"),
        pk_columns: vec!["id".into()],
        fields: vec![
            FieldDescriptor { required: true, ..FieldDescriptor::stored("body", "body") },
            FieldDescriptor { field_type: FieldType::Timestamp, read_only: true, ..FieldDescriptor::stored("created_at", "created_at") },
        ],
        relationships: vec![
            RelationshipDescriptor {
                name: "commentable".into(),
                kind: RelationshipKind::BelongsToPolymorphic {
                    id_column: "commentable_id".into(),
                    type_column: "commentable_type".into(),
                    target_types: vec!["articles".into(), "posts".into(), "videos".into()],
                },
            },
            RelationshipDescriptor {
                name: "author".into(),
                kind: RelationshipKind::BelongsTo { foreign_key: "author_id".into(), target_type: "people".into() },
            },
        ],
        search: Some(SearchDescriptor {
            columns: vec!["body".into()],
            fields: {
                let mut fields = IndexMap::new();
                fields.insert(
                    "commentableTitle".to_string(),
                    SearchFieldDescriptor {
                        target: SearchTarget::Polymorphic {
                            field: "commentable".into(),
                            target_fields: vec!["title".into(), "title".into(), "title".into()],
                        },
                        apply_filter: None,
                    },
                );
                fields.insert(
                    "recent".to_string(),
                    SearchFieldDescriptor {
                        target: SearchTarget::ActualField(vec!["body".into()]),
                        apply_filter: Some(recent_comments_filter()),
                    },
                );
                fields
            },
        }),
        insertable: true,
        updatable: true,
        deletable: true,
    }
}

/// `filter[recent]=<timestamp>` — an `applyFilter` escape hatch for a
/// predicate the declarative `SearchTarget` shapes can't express on their
/// own: `created_at` past a cutoff, ANDed alongside whatever `recent`'s
/// `ActualField` target already contributed.
fn recent_comments_filter() -> ApplyFilter {
    std::sync::Arc::new(|value: &jsonapi_core::request::FilterValue| {
        let cutoff = match value {
            jsonapi_core::request::FilterValue::Scalar(s) => s.clone(),
            jsonapi_core::request::FilterValue::List(values) => values.first().cloned().unwrap_or_default(),
        };
        jsonapi_sql::Expr::gt("created_at", cutoff)
    })
}

fn tags() -> ResourceDescriptor {
    ResourceDescriptor {
        type_name: "tags".into(),
        table: QualifiedIdentifier::new("public", "tags"),
        pk_columns: vec!["id".into()],
        fields: vec![FieldDescriptor { required: true, unique: true, indexed: true, ..FieldDescriptor::stored("name", "name") }],
        relationships: vec![RelationshipDescriptor {
            name: "articles".into(),
            kind: RelationshipKind::ManyToMany {
                join_table: QualifiedIdentifier::new("public", "articles_tags"),
                source_fk: "tag_id".into(),
                target_fk: "article_id".into(),
                target_type: "articles".into(),
                inverse_name: "tags".into(),
            },
        }],
        search: None,
        insertable: true,
        updatable: true,
        deletable: false,
    }
}
