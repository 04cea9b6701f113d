//! Builds the include tree for a request's `include` paths and the
//! per-hop IN-list fetch each node needs. Dotted paths that share a prefix
//! (`comments` and `comments.author`) merge into one node so the "comments"
//! hop is only fetched once no matter how many deeper paths need it.

use crate::error::{Error, Result};
use crate::request::IncludePath;
use crate::schema::{CompiledSchema, RelationshipKind};

/// One relationship hop in the merged include forest.
#[derive(Clone, Debug)]
pub struct IncludeNode {
    pub relationship_name: String,
    pub target_type: String,
    pub kind: RelationshipKind,
    pub children: Vec<IncludeNode>,
}

impl IncludeNode {
    /// Whether fetching this node for a batch of parent ids can use a
    /// single `WHERE foreign_key IN (...)` or needs a join table first.
    pub fn needs_join_table(&self) -> bool {
        matches!(self.kind, RelationshipKind::ManyToMany { .. })
    }
}

/// Merge a request's `include` paths into a forest of [`IncludeNode`]s,
/// validating every segment against the schema.
pub fn plan_includes(root_type: &str, schema: &CompiledSchema, paths: &[IncludePath]) -> Result<Vec<IncludeNode>> {
    let mut forest: Vec<IncludeNode> = Vec::new();
    for path in paths {
        insert_path(&mut forest, root_type, schema, path)?;
    }
    Ok(forest)
}

fn insert_path(siblings: &mut Vec<IncludeNode>, current_type: &str, schema: &CompiledSchema, path: &[String]) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(());
    };

    let resource = schema.require(current_type)?;
    let rel = resource
        .relationship(head)
        .ok_or_else(|| Error::InvalidInclude(format!("unknown relationship '{head}' on '{current_type}'")))?;
    let target_type = rel
        .target_types()
        .first()
        .ok_or_else(|| Error::SchemaInvalid(format!("relationship '{head}' has no target type")))?
        .to_string();

    let existing = siblings.iter_mut().find(|n| n.relationship_name == *head);
    let node = match existing {
        Some(node) => node,
        None => {
            siblings.push(IncludeNode {
                relationship_name: head.clone(),
                target_type: target_type.clone(),
                kind: rel.kind.clone(),
                children: Vec::new(),
            });
            siblings.last_mut().unwrap()
        }
    };

    insert_path(&mut node.children, &target_type, schema, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{compile, FieldDescriptor, RelationshipDescriptor, ResourceDescriptor};

    fn schema() -> CompiledSchema {
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: crate::request::QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("title", "title")],
            relationships: vec![RelationshipDescriptor {
                name: "comments".into(),
                kind: RelationshipKind::HasMany { target_type: "comments".into(), foreign_key: "article_id".into() },
            }],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        let comments = ResourceDescriptor {
            type_name: "comments".into(),
            table: crate::request::QualifiedIdentifier::new("public", "comments"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("body", "body")],
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
        compile(vec![articles, comments, people]).unwrap()
    }

    #[test]
    fn test_shared_prefix_merges_into_one_node() {
        let schema = schema();
        let paths = vec![vec!["comments".to_string()], vec!["comments".to_string(), "author".to_string()]];
        let forest = plan_includes("articles", &schema, &paths).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].relationship_name, "author");
    }

    #[test]
    fn test_unknown_relationship_rejected() {
        let schema = schema();
        let paths = vec![vec!["bogus".to_string()]];
        assert!(plan_includes("articles", &schema, &paths).is_err());
    }
}
