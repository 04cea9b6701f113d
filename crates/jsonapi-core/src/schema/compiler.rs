//! Install-time schema compiler.
//!
//! Validates every [`ResourceDescriptor`] against the invariants the rest of
//! the crate relies on, then derives the `getter_order` (topological order
//! for computed fields) and `join_index` (precomputed relationship join
//! chains) each [`CompiledResource`] carries.

use super::{CompiledResource, CompiledSchema, JoinChain, JoinHop, RelationshipKind, ResourceDescriptor};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Compile a set of resource descriptors into a [`CompiledSchema`].
///
/// Returns `Error::SchemaInvalid` on the first violated invariant found.
/// Order of checks: per-resource shape, then cross-resource relationship
/// targets, then computed-field cycles, then join index derivation.
pub fn compile(descriptors: Vec<ResourceDescriptor>) -> Result<CompiledSchema> {
    let mut by_type: IndexMap<String, ResourceDescriptor> = IndexMap::new();
    for descriptor in descriptors {
        if by_type.contains_key(&descriptor.type_name) {
            return Err(Error::SchemaInvalid(format!(
                "duplicate resource type '{}'",
                descriptor.type_name
            )));
        }
        validate_resource_shape(&descriptor)?;
        by_type.insert(descriptor.type_name.clone(), descriptor);
    }

    validate_relationship_targets(&by_type)?;
    validate_many_to_many_inverses(&by_type)?;

    let mut resources = IndexMap::new();
    for (type_name, descriptor) in &by_type {
        let getter_order = topological_getter_order(descriptor)?;
        let join_index = build_join_index(descriptor, &by_type)?;
        resources.insert(
            type_name.clone(),
            CompiledResource {
                descriptor: descriptor.clone(),
                getter_order,
                join_index,
            },
        );
    }

    Ok(CompiledSchema { resources })
}

/// Per-resource checks that don't require looking at other resources:
/// - no duplicate field/relationship names
/// - foreign-key columns backing a `belongsTo` may not also be exposed as a
///   plain attribute (the relationship is the only way to see/set them)
/// - a field name can't be declared both as a stored column and a computed
///   field (ambiguous which one serializes)
fn validate_resource_shape(descriptor: &ResourceDescriptor) -> Result<()> {
    let mut seen_field_names = HashSet::new();
    let mut seen_columns = HashSet::new();
    for field in &descriptor.fields {
        if !seen_field_names.insert(field.name.clone()) {
            return Err(Error::SchemaInvalid(format!(
                "{}: duplicate field name '{}'",
                descriptor.type_name, field.name
            )));
        }
        if field.computed.is_none() && !seen_columns.insert(field.column.clone()) {
            return Err(Error::SchemaInvalid(format!(
                "{}: column '{}' is bound to more than one stored field",
                descriptor.type_name, field.column
            )));
        }
    }

    let mut seen_rel_names = HashSet::new();
    for rel in &descriptor.relationships {
        if !seen_rel_names.insert(rel.name.clone()) {
            return Err(Error::SchemaInvalid(format!(
                "{}: duplicate relationship name '{}'",
                descriptor.type_name, rel.name
            )));
        }
        if let RelationshipKind::BelongsTo { foreign_key, .. } = &rel.kind {
            if seen_columns.contains(foreign_key) {
                return Err(Error::SchemaInvalid(format!(
                    "{}: foreign key column '{}' backing relationship '{}' must not also be a plain attribute",
                    descriptor.type_name, foreign_key, rel.name
                )));
            }
        }
        if let RelationshipKind::BelongsToPolymorphic { id_column, type_column, .. } = &rel.kind {
            for column in [id_column, type_column] {
                if seen_columns.contains(column) {
                    return Err(Error::SchemaInvalid(format!(
                        "{}: column '{}' backing polymorphic relationship '{}' must not also be a plain attribute",
                        descriptor.type_name, column, rel.name
                    )));
                }
            }
        }
    }

    if descriptor.pk_columns.is_empty() {
        return Err(Error::SchemaInvalid(format!(
            "{}: must declare at least one primary key column",
            descriptor.type_name
        )));
    }

    Ok(())
}

/// Every relationship must point at a type that's actually declared.
fn validate_relationship_targets(by_type: &IndexMap<String, ResourceDescriptor>) -> Result<()> {
    for descriptor in by_type.values() {
        for rel in &descriptor.relationships {
            for target in rel.target_types() {
                if !by_type.contains_key(target) {
                    return Err(Error::SchemaInvalid(format!(
                        "{}: relationship '{}' targets unknown resource type '{}'",
                        descriptor.type_name, rel.name, target
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Two `ManyToMany` relationships sharing a join table must not declare the
/// same `inverse_name` — the eager loader would have no way to tell which
/// relationship's rows belong to which inverse.
fn validate_many_to_many_inverses(by_type: &IndexMap<String, ResourceDescriptor>) -> Result<()> {
    let mut seen: HashMap<(String, String, String), String> = HashMap::new();
    for descriptor in by_type.values() {
        for rel in &descriptor.relationships {
            if let RelationshipKind::ManyToMany {
                join_table,
                inverse_name,
                ..
            } = &rel.kind
            {
                let key = (
                    join_table.to_string(),
                    descriptor.type_name.clone(),
                    inverse_name.clone(),
                );
                if let Some(existing) = seen.insert(key, rel.name.clone()) {
                    return Err(Error::SchemaInvalid(format!(
                        "{}: many-to-many relationships '{}' and '{}' on join table '{}' declare the same inverse name '{}'",
                        descriptor.type_name, existing, rel.name, join_table, inverse_name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Topologically sort computed fields by their declared dependencies so
/// that serialization can evaluate them in one pass. A cycle (direct or
/// indirect self-dependency) is a schema error.
fn topological_getter_order(descriptor: &ResourceDescriptor) -> Result<Vec<String>> {
    let computed: HashMap<&str, &[String]> = descriptor
        .fields
        .iter()
        .filter_map(|f| f.computed.as_ref().map(|c| (f.name.as_str(), c.depends_on.as_slice())))
        .collect();

    let mut order = Vec::with_capacity(computed.len());
    let mut visited: HashMap<&str, VisitState> = HashMap::new();

    for &name in computed.keys() {
        visit(name, &computed, &mut visited, &mut order, descriptor)?;
    }

    Ok(order.into_iter().map(String::from).collect())
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    Visiting,
    Done,
}

fn visit<'a>(
    name: &'a str,
    computed: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashMap<&'a str, VisitState>,
    order: &mut Vec<&'a str>,
    descriptor: &ResourceDescriptor,
) -> Result<()> {
    match visited.get(name) {
        Some(VisitState::Done) => return Ok(()),
        Some(VisitState::Visiting) => {
            return Err(Error::SchemaInvalid(format!(
                "{}: computed field '{}' participates in a dependency cycle",
                descriptor.type_name, name
            )));
        }
        None => {}
    }

    visited.insert(name, VisitState::Visiting);
    if let Some(deps) = computed.get(name) {
        for dep in deps.iter() {
            if computed.contains_key(dep.as_str()) {
                visit(dep, computed, visited, order, descriptor)?;
            }
        }
    }
    visited.insert(name, VisitState::Done);
    order.push(name);
    Ok(())
}

/// Build the precomputed join chain for every relationship name (depth 1)
/// reachable from this resource. Deeper dotted paths (`author.publisher`)
/// are resolved on demand by the query planner by walking one hop's
/// `target_type` into the next hop's own `join_index`, bounded by
/// `max_include_depth` — the compiler only needs to guarantee each
/// individual hop resolves to a real relationship.
fn build_join_index(
    descriptor: &ResourceDescriptor,
    by_type: &IndexMap<String, ResourceDescriptor>,
) -> Result<HashMap<String, JoinChain>> {
    let mut index = HashMap::new();
    for rel in &descriptor.relationships {
        let target = rel.target_types().first().copied().unwrap_or_default();
        if !by_type.contains_key(target) {
            return Err(Error::SchemaInvalid(format!(
                "{}: cannot build join index for relationship '{}', unknown target",
                descriptor.type_name, rel.name
            )));
        }
        index.insert(
            rel.name.clone(),
            JoinChain {
                hops: vec![JoinHop {
                    relationship_name: rel.name.clone(),
                    target_type: target.to_string(),
                }],
            },
        );
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::QualifiedIdentifier;
    use crate::schema::{FieldDescriptor, RelationshipDescriptor};

    fn table(name: &str) -> QualifiedIdentifier {
        QualifiedIdentifier::new("public", name)
    }

    fn articles() -> ResourceDescriptor {
        ResourceDescriptor {
            type_name: "articles".into(),
            table: table("articles"),
            pk_columns: vec!["id".into()],
            fields: vec![
                FieldDescriptor::stored("title", "title"),
                FieldDescriptor::computed("excerpt", "excerpt", vec!["title".into()], "left(title, 80)"),
            ],
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
        }
    }

    fn people() -> ResourceDescriptor {
        ResourceDescriptor {
            type_name: "people".into(),
            table: table("people"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("name", "name")],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        }
    }

    #[test]
    fn test_compiles_valid_schema() {
        let schema = compile(vec![articles(), people()]).unwrap();
        assert!(schema.get("articles").is_some());
        assert_eq!(
            schema.get("articles").unwrap().getter_order,
            vec!["excerpt".to_string()]
        );
    }

    #[test]
    fn test_rejects_fk_leaking_into_attributes() {
        let mut bad = articles();
        bad.fields.push(FieldDescriptor::stored("author_id", "author_id"));
        let err = compile(vec![bad, people()]).unwrap_err();
        assert!(matches!(err, Error::SchemaInvalid(_)));
    }

    #[test]
    fn test_rejects_unknown_relationship_target() {
        let mut bad = articles();
        bad.relationships[0].kind = RelationshipKind::BelongsTo {
            foreign_key: "author_id".into(),
            target_type: "ghosts".into(),
        };
        let err = compile(vec![bad]).unwrap_err();
        assert!(matches!(err, Error::SchemaInvalid(_)));
    }

    #[test]
    fn test_rejects_computed_field_cycle() {
        let mut bad = people();
        bad.fields.push(FieldDescriptor::computed("a", "a", vec!["b".into()], "b"));
        bad.fields.push(FieldDescriptor::computed("b", "b", vec!["a".into()], "a"));
        let err = compile(vec![bad]).unwrap_err();
        assert!(matches!(err, Error::SchemaInvalid(_)));
    }
}
