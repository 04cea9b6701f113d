//! Turns a relationship-endpoint write (`RelationshipOp`) into a concrete
//! statement against whichever side of the relationship actually owns the
//! foreign key — a `belongsTo`/`hasOne`/`hasMany` write is a column update
//! on the owning table, a `manyToMany` write is an insert/delete against
//! the join table.

use crate::error::{Error, Result};
use crate::plan::RelationshipOp;
use crate::request::QualifiedIdentifier;
use crate::schema::{CompiledSchema, RelationshipKind};

/// A concrete linkage write ready for the storage layer.
#[derive(Clone, Debug)]
pub enum LinkageStatement {
    /// Set `foreign_key` on the single `table` row identified by `id`.
    SetForeignKey { table: QualifiedIdentifier, id: String, foreign_key: String, value: Option<String> },
    /// Set `foreign_key` to `parent_id` on every row in `ids`, and clear it
    /// on any other row currently pointing at `parent_id` (only emitted for
    /// a wholesale replace, not an append).
    RepointForeignKeys {
        table: QualifiedIdentifier,
        foreign_key: String,
        parent_id: String,
        ids: Vec<String>,
        clear_others: bool,
    },
    /// Insert rows into a many-to-many join table.
    InsertJoinRows { join_table: QualifiedIdentifier, source_fk: String, source_id: String, target_fk: String, target_ids: Vec<String> },
    /// Delete rows from a many-to-many join table.
    DeleteJoinRows { join_table: QualifiedIdentifier, source_fk: String, source_id: String, target_fk: String, target_ids: Option<Vec<String>> },
}

/// Resolve a `RelationshipOp` against the owning side of the relationship.
pub fn resolve_relationship_op(
    schema: &CompiledSchema,
    type_name: &str,
    parent_id: &str,
    relationship_name: &str,
    op: &RelationshipOp,
) -> Result<Vec<LinkageStatement>> {
    let resource = schema.require(type_name)?;
    let rel = resource
        .relationship(relationship_name)
        .ok_or_else(|| Error::NotFound(format!("relationship '{relationship_name}' on '{type_name}'")))?;

    match (&rel.kind, op) {
        (RelationshipKind::BelongsTo { foreign_key, .. }, RelationshipOp::ReplaceToOne(identifier)) => {
            Ok(vec![LinkageStatement::SetForeignKey {
                table: resource.descriptor.table.clone(),
                id: parent_id.to_string(),
                foreign_key: foreign_key.clone(),
                value: identifier.as_ref().map(|i| i.id.clone()),
            }])
        }
        (RelationshipKind::HasOne { target_type, foreign_key }, RelationshipOp::ReplaceToOne(identifier)) => {
            let target = schema.require(target_type)?;
            Ok(vec![LinkageStatement::RepointForeignKeys {
                table: target.descriptor.table.clone(),
                foreign_key: foreign_key.clone(),
                parent_id: parent_id.to_string(),
                ids: identifier.iter().map(|i| i.id.clone()).collect(),
                clear_others: true,
            }])
        }
        (RelationshipKind::HasMany { target_type, foreign_key }, RelationshipOp::ReplaceToMany(identifiers)) => {
            let target = schema.require(target_type)?;
            Ok(vec![LinkageStatement::RepointForeignKeys {
                table: target.descriptor.table.clone(),
                foreign_key: foreign_key.clone(),
                parent_id: parent_id.to_string(),
                ids: identifiers.iter().map(|i| i.id.clone()).collect(),
                clear_others: true,
            }])
        }
        (RelationshipKind::HasMany { target_type, foreign_key }, RelationshipOp::Add(identifiers)) => {
            let target = schema.require(target_type)?;
            Ok(vec![LinkageStatement::RepointForeignKeys {
                table: target.descriptor.table.clone(),
                foreign_key: foreign_key.clone(),
                parent_id: parent_id.to_string(),
                ids: identifiers.iter().map(|i| i.id.clone()).collect(),
                clear_others: false,
            }])
        }
        (RelationshipKind::HasMany { target_type, foreign_key }, RelationshipOp::Remove(identifiers)) => {
            let target = schema.require(target_type)?;
            Ok(identifiers
                .iter()
                .map(|identifier| LinkageStatement::SetForeignKey {
                    table: target.descriptor.table.clone(),
                    id: identifier.id.clone(),
                    foreign_key: foreign_key.clone(),
                    value: None,
                })
                .collect())
        }
        (RelationshipKind::ManyToMany { join_table, source_fk, target_fk, .. }, RelationshipOp::Add(identifiers)) => {
            Ok(vec![LinkageStatement::InsertJoinRows {
                join_table: join_table.clone(),
                source_fk: source_fk.clone(),
                source_id: parent_id.to_string(),
                target_fk: target_fk.clone(),
                target_ids: identifiers.iter().map(|i| i.id.clone()).collect(),
            }])
        }
        (RelationshipKind::ManyToMany { join_table, source_fk, target_fk, .. }, RelationshipOp::ReplaceToMany(identifiers)) => {
            Ok(vec![
                LinkageStatement::DeleteJoinRows {
                    join_table: join_table.clone(),
                    source_fk: source_fk.clone(),
                    source_id: parent_id.to_string(),
                    target_fk: target_fk.clone(),
                    target_ids: None,
                },
                LinkageStatement::InsertJoinRows {
                    join_table: join_table.clone(),
                    source_fk: source_fk.clone(),
                    source_id: parent_id.to_string(),
                    target_fk: target_fk.clone(),
                    target_ids: identifiers.iter().map(|i| i.id.clone()).collect(),
                },
            ])
        }
        (RelationshipKind::ManyToMany { join_table, source_fk, target_fk, .. }, RelationshipOp::Remove(identifiers)) => {
            Ok(vec![LinkageStatement::DeleteJoinRows {
                join_table: join_table.clone(),
                source_fk: source_fk.clone(),
                source_id: parent_id.to_string(),
                target_fk: target_fk.clone(),
                target_ids: Some(identifiers.iter().map(|i| i.id.clone()).collect()),
            }])
        }
        _ => Err(Error::Conflict(format!(
            "relationship '{relationship_name}' does not support this write shape"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ResourceIdentifier;
    use crate::schema::{compile, FieldDescriptor, RelationshipDescriptor, ResourceDescriptor};

    fn schema() -> CompiledSchema {
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("title", "title")],
            relationships: vec![
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
                RelationshipDescriptor {
                    name: "author".into(),
                    kind: RelationshipKind::BelongsTo { foreign_key: "author_id".into(), target_type: "people".into() },
                },
            ],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let tags = ResourceDescriptor {
            type_name: "tags".into(),
            table: QualifiedIdentifier::new("public", "tags"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("name", "name")],
            relationships: vec![],
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
        compile(vec![articles, tags, people]).unwrap()
    }

    #[test]
    fn test_many_to_many_add() {
        let schema = schema();
        let identifiers = vec![ResourceIdentifier { type_name: "tags".into(), id: "1".into() }];
        let stmts = resolve_relationship_op(&schema, "articles", "5", "tags", &RelationshipOp::Add(identifiers)).unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], LinkageStatement::InsertJoinRows { .. }));
    }

    #[test]
    fn test_belongs_to_replace_clears_with_null() {
        let schema = schema();
        let stmts = resolve_relationship_op(&schema, "articles", "5", "author", &RelationshipOp::ReplaceToOne(None)).unwrap();
        match &stmts[0] {
            LinkageStatement::SetForeignKey { value, .. } => assert!(value.is_none()),
            _ => panic!("expected SetForeignKey"),
        }
    }

    #[test]
    fn test_mismatched_op_rejected() {
        let schema = schema();
        let identifiers = vec![ResourceIdentifier { type_name: "people".into(), id: "1".into() }];
        assert!(resolve_relationship_op(&schema, "articles", "5", "author", &RelationshipOp::Add(identifiers)).is_err());
    }
}
