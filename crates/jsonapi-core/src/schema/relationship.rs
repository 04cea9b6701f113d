//! Relationship descriptors: belongsTo/hasOne/hasMany/manyToMany, including
//! polymorphic hasMany.

use crate::request::QualifiedIdentifier;

/// A named relationship field on a resource.
#[derive(Clone, Debug)]
pub struct RelationshipDescriptor {
    /// Name exposed under `data.relationships`.
    pub name: String,
    pub kind: RelationshipKind,
}

impl RelationshipDescriptor {
    pub fn target_types(&self) -> Vec<&str> {
        match &self.kind {
            RelationshipKind::BelongsTo { target_type, .. }
            | RelationshipKind::HasOne { target_type, .. }
            | RelationshipKind::HasMany { target_type, .. }
            | RelationshipKind::ManyToMany { target_type, .. } => vec![target_type.as_str()],
            RelationshipKind::HasManyPolymorphic { target_types, .. }
            | RelationshipKind::BelongsToPolymorphic { target_types, .. } => {
                target_types.iter().map(|s| s.as_str()).collect()
            }
        }
    }

    pub fn is_to_many(&self) -> bool {
        matches!(
            self.kind,
            RelationshipKind::HasMany { .. }
                | RelationshipKind::HasManyPolymorphic { .. }
                | RelationshipKind::ManyToMany { .. }
        )
    }
}

/// The shape of a relationship, grounded on the cardinalities the teacher's
/// foreign-key introspection produced (`Cardinality::{O2M,M2O,O2O,M2M}`),
/// plus polymorphic hasMany which the declarative model must name explicitly
/// since there's no FK constraint to introspect.
#[derive(Clone, Debug)]
pub enum RelationshipKind {
    /// This resource holds the foreign key and points at exactly one parent.
    BelongsTo {
        foreign_key: String,
        target_type: String,
    },
    /// This resource is pointed at by exactly one child's foreign key.
    HasOne {
        target_type: String,
        foreign_key: String,
    },
    /// This resource is pointed at by many children's foreign keys.
    HasMany {
        target_type: String,
        foreign_key: String,
    },
    /// Like `HasMany`, but the children's foreign key is discriminated by a
    /// sibling `{foreign_key}_type` column naming which resource type it
    /// points at (the standard Rails/ActiveRecord-style polymorphic shape).
    HasManyPolymorphic {
        foreign_key: String,
        foreign_type_column: String,
        discriminant: String,
        target_types: Vec<String>,
    },
    /// This resource holds a `{id_column}`/`{type_column}` pair naming which
    /// row of which resource type it points at (the standard
    /// Rails/ActiveRecord-style polymorphic `belongsTo`, e.g. a comment's
    /// `commentable`). Unlike plain `BelongsTo`, the target type is only
    /// known per row, at read time — the schema can only enumerate the
    /// types it's allowed to be.
    BelongsToPolymorphic {
        id_column: String,
        type_column: String,
        target_types: Vec<String>,
    },
    /// Linked through a join table.
    ManyToMany {
        join_table: QualifiedIdentifier,
        source_fk: String,
        target_fk: String,
        target_type: String,
        /// Name of the relationship on `target_type` that walks back through
        /// the same join table. Must be unique per join table — two
        /// relationships sharing a join table can't declare the same
        /// inverse name without becoming ambiguous to eager-load.
        inverse_name: String,
    },
}
