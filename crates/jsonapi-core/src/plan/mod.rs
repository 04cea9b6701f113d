//! Query planning: turns a parsed [`ApiRequest`] plus the compiled schema
//! into an execution plan the SQL builder and relationship engine consume.

mod mutate_plan;
mod read_plan;
mod types;

pub use mutate_plan::{ColumnValue, MutatePlan, RelationshipWrite};
pub use read_plan::{validate_includes, ReadPlan};
pub use types::{PaginationPlan, PlannedJoin, ResolvedFilter, ResolvedSort, SelectColumn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::request::{Action, ApiRequest, Payload, ResourceIdentifier};
use crate::schema::CompiledSchema;

/// A linkage write against a single relationship endpoint
/// (`/{type}/{id}/relationships/{rel}`).
#[derive(Clone, Debug)]
pub enum RelationshipOp {
    /// `POST` — append to a to-many relationship.
    Add(Vec<ResourceIdentifier>),
    /// `PATCH` — replace a to-one relationship's linkage.
    ReplaceToOne(Option<ResourceIdentifier>),
    /// `PATCH` — replace a to-many relationship's linkage wholesale.
    ReplaceToMany(Vec<ResourceIdentifier>),
    /// `DELETE` — remove the named members from a to-many relationship.
    Remove(Vec<ResourceIdentifier>),
}

/// A plan for fetching a related resource or its linkage — the target's
/// read plan is fully resolved except for the predicate linking it back to
/// the parent row, which the relationship engine fills in at execution time
/// using the relationship's [`crate::schema::RelationshipKind`].
#[derive(Clone, Debug)]
pub struct RelationshipFetchPlan {
    pub parent_type: String,
    pub parent_id: String,
    pub relationship_name: String,
    pub target: ReadPlan,
    pub single: bool,
}

/// The execution plan for an API request.
#[derive(Clone, Debug)]
pub enum ActionPlan {
    FetchCollection { plan: ReadPlan, includes: Vec<crate::request::IncludePath> },
    FetchResource { plan: ReadPlan, id: String, includes: Vec<crate::request::IncludePath> },
    FetchRelated(RelationshipFetchPlan),
    FetchRelationship { parent_type: String, parent_id: String, relationship_name: String },
    Mutate(MutatePlan),
    RelationshipWrite { parent_type: String, parent_id: String, relationship_name: String, op: RelationshipOp },
}

/// Build the execution plan for a fully parsed request.
pub fn create_action_plan(request: &ApiRequest, schema: &CompiledSchema, config: &AppConfig) -> Result<ActionPlan> {
    match &request.action {
        Action::FetchCollection { type_name } => {
            let includes = validate_includes(type_name, schema, &request.query_params.include, config)?;
            let plan = ReadPlan::for_primary(type_name, schema, &request.query_params, config, false)?;
            Ok(ActionPlan::FetchCollection { plan, includes })
        }
        Action::FetchResource { type_name, id } => {
            let includes = validate_includes(type_name, schema, &request.query_params.include, config)?;
            let plan = ReadPlan::for_primary(type_name, schema, &request.query_params, config, true)?;
            Ok(ActionPlan::FetchResource { plan, id: id.clone(), includes })
        }
        Action::FetchRelated { type_name, id, relationship } => {
            let resource = schema.require(type_name)?;
            let rel = resource
                .relationship(relationship)
                .ok_or_else(|| Error::NotFound(format!("relationship '{relationship}' on '{type_name}'")))?;
            let target_type = rel
                .target_types()
                .first()
                .ok_or_else(|| Error::SchemaInvalid(format!("relationship '{relationship}' has no target type")))?
                .to_string();
            let single = !rel.is_to_many();
            let target = ReadPlan::for_primary(&target_type, schema, &request.query_params, config, single)?;
            Ok(ActionPlan::FetchRelated(RelationshipFetchPlan {
                parent_type: type_name.clone(),
                parent_id: id.clone(),
                relationship_name: relationship.clone(),
                target,
                single,
            }))
        }
        Action::FetchRelationship { type_name, id, relationship } => {
            let resource = schema.require(type_name)?;
            resource
                .relationship(relationship)
                .ok_or_else(|| Error::NotFound(format!("relationship '{relationship}' on '{type_name}'")))?;
            Ok(ActionPlan::FetchRelationship {
                parent_type: type_name.clone(),
                parent_id: id.clone(),
                relationship_name: relationship.clone(),
            })
        }
        Action::CreateResource { type_name } => {
            let resource = schema.require(type_name)?;
            let body = require_single(&request.payload, type_name)?;
            Ok(ActionPlan::Mutate(MutatePlan::create(resource, schema, body)?))
        }
        Action::UpdateResource { type_name, id } => {
            let resource = schema.require(type_name)?;
            let body = require_single(&request.payload, type_name)?;
            Ok(ActionPlan::Mutate(MutatePlan::update(resource, schema, id, body)?))
        }
        Action::UpsertResource { type_name, id } => {
            let resource = schema.require(type_name)?;
            let body = require_single(&request.payload, type_name)?;
            Ok(ActionPlan::Mutate(MutatePlan::upsert(resource, schema, id, body)?))
        }
        Action::DeleteResource { type_name, id } => {
            let resource = schema.require(type_name)?;
            Ok(ActionPlan::Mutate(MutatePlan::delete(resource, id)?))
        }
        Action::AddToRelationship { type_name, id, relationship } => {
            let identifiers = require_linkage(&request.payload)?;
            validate_relationship_target(schema, type_name, relationship, &identifiers)?;
            Ok(ActionPlan::RelationshipWrite {
                parent_type: type_name.clone(),
                parent_id: id.clone(),
                relationship_name: relationship.clone(),
                op: RelationshipOp::Add(identifiers),
            })
        }
        Action::ReplaceRelationship { type_name, id, relationship } => {
            let resource = schema.require(type_name)?;
            let rel = resource
                .relationship(relationship)
                .ok_or_else(|| Error::NotFound(format!("relationship '{relationship}' on '{type_name}'")))?;
            let op = if rel.is_to_many() {
                let identifiers = require_linkage(&request.payload)?;
                validate_relationship_target(schema, type_name, relationship, &identifiers)?;
                RelationshipOp::ReplaceToMany(identifiers)
            } else {
                let identifier = require_nullable_linkage(&request.payload)?;
                if let Some(identifier) = &identifier {
                    validate_relationship_target(schema, type_name, relationship, std::slice::from_ref(identifier))?;
                }
                RelationshipOp::ReplaceToOne(identifier)
            };
            Ok(ActionPlan::RelationshipWrite {
                parent_type: type_name.clone(),
                parent_id: id.clone(),
                relationship_name: relationship.clone(),
                op,
            })
        }
        Action::RemoveFromRelationship { type_name, id, relationship } => {
            let identifiers = require_linkage(&request.payload)?;
            validate_relationship_target(schema, type_name, relationship, &identifiers)?;
            Ok(ActionPlan::RelationshipWrite {
                parent_type: type_name.clone(),
                parent_id: id.clone(),
                relationship_name: relationship.clone(),
                op: RelationshipOp::Remove(identifiers),
            })
        }
    }
}

fn require_single<'a>(payload: &'a Option<Payload>, expected_type: &str) -> Result<&'a crate::request::ResourceObject> {
    match payload {
        Some(Payload::Single(resource)) => {
            if resource.type_name != expected_type {
                return Err(Error::Conflict(format!(
                    "payload type '{}' does not match endpoint type '{expected_type}'",
                    resource.type_name
                )));
            }
            Ok(resource)
        }
        _ => Err(Error::Payload("expected a single resource object under 'data'".into())),
    }
}

fn require_linkage(payload: &Option<Payload>) -> Result<Vec<ResourceIdentifier>> {
    match payload {
        Some(Payload::Linkage(identifiers)) => Ok(identifiers.clone()),
        _ => Err(Error::Payload("expected a resource linkage array under 'data'".into())),
    }
}

fn require_nullable_linkage(payload: &Option<Payload>) -> Result<Option<ResourceIdentifier>> {
    match payload {
        Some(Payload::Null) => Ok(None),
        Some(Payload::Single(_)) => Err(Error::Payload("to-one relationship linkage must be a resource identifier or null".into())),
        Some(Payload::Linkage(identifiers)) if identifiers.len() == 1 => Ok(identifiers.first().cloned()),
        _ => Err(Error::Payload("expected a resource identifier or null under 'data'".into())),
    }
}

fn validate_relationship_target(
    schema: &CompiledSchema,
    type_name: &str,
    relationship: &str,
    identifiers: &[ResourceIdentifier],
) -> Result<()> {
    let resource = schema.require(type_name)?;
    let rel = resource
        .relationship(relationship)
        .ok_or_else(|| Error::NotFound(format!("relationship '{relationship}' on '{type_name}'")))?;
    let target_types = rel.target_types();
    for identifier in identifiers {
        if !target_types.iter().any(|t| *t == identifier.type_name) {
            return Err(Error::Conflict(format!(
                "'{}' is not a valid target type for relationship '{relationship}'",
                identifier.type_name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{compile, FieldDescriptor, ResourceDescriptor};

    fn test_schema() -> CompiledSchema {
        let articles = ResourceDescriptor {
            type_name: "articles".into(),
            table: crate::request::QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            fields: vec![FieldDescriptor::stored("title", "title")],
            relationships: vec![],
            search: None,
            insertable: true,
            updatable: true,
            deletable: true,
        };
        compile(vec![articles]).unwrap()
    }

    #[test]
    fn test_fetch_collection_plan() {
        let schema = test_schema();
        let config = AppConfig::default();
        let request = ApiRequest {
            action: Action::FetchCollection { type_name: "articles".into() },
            payload: None,
            query_params: Default::default(),
            preferences: Default::default(),
            method: "GET".into(),
            path: "/articles".into(),
            headers: Default::default(),
        };
        let plan = create_action_plan(&request, &schema, &config).unwrap();
        assert!(matches!(plan, ActionPlan::FetchCollection { .. }));
    }

    #[test]
    fn test_delete_requires_no_payload() {
        let schema = test_schema();
        let config = AppConfig::default();
        let request = ApiRequest {
            action: Action::DeleteResource { type_name: "articles".into(), id: "1".into() },
            payload: None,
            query_params: Default::default(),
            preferences: Default::default(),
            method: "DELETE".into(),
            path: "/articles/1".into(),
            headers: Default::default(),
        };
        let plan = create_action_plan(&request, &schema, &config).unwrap();
        assert!(matches!(plan, ActionPlan::Mutate(MutatePlan::Delete { .. })));
    }

    #[test]
    fn test_create_without_body_errors() {
        let schema = test_schema();
        let config = AppConfig::default();
        let request = ApiRequest {
            action: Action::CreateResource { type_name: "articles".into() },
            payload: None,
            query_params: Default::default(),
            preferences: Default::default(),
            method: "POST".into(),
            path: "/articles".into(),
            headers: Default::default(),
        };
        assert!(create_action_plan(&request, &schema, &config).is_err());
    }
}
