//! Resource schema compiler.
//!
//! Resources are declared as [`ResourceDescriptor`]s and compiled once, at
//! install time, into a [`CompiledSchema`]. Compilation enforces every
//! structural invariant (cycle-free computed fields, no foreign-key leakage
//! into attributes, unique many-to-many inverses, ...) so that request
//! handling never has to re-validate resource shape.

mod compiler;
mod field;
mod relationship;

pub use compiler::compile;
pub use field::{ComputedField, FieldDescriptor, FieldType, Hidden};
pub use relationship::{RelationshipDescriptor, RelationshipKind};

use crate::error::Result;
use crate::request::QualifiedIdentifier;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A declarative description of one JSON:API resource type.
#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    /// JSON:API resource type, e.g. `"articles"`.
    pub type_name: String,
    /// Backing table or view.
    pub table: QualifiedIdentifier,
    /// Primary key column(s), in declaration order.
    pub pk_columns: Vec<String>,
    /// Attribute fields, in declaration order.
    pub fields: Vec<FieldDescriptor>,
    /// Relationship fields, in declaration order.
    pub relationships: Vec<RelationshipDescriptor>,
    /// Full-text/trigram search configuration, if this resource supports `filter[search]`.
    pub search: Option<SearchDescriptor>,
    pub insertable: bool,
    pub updatable: bool,
    pub deletable: bool,
}

/// Search configuration for a resource.
#[derive(Clone, Debug, Default)]
pub struct SearchDescriptor {
    /// Columns participating in the `filter[search]` vector, in ranking order.
    pub columns: Vec<String>,
    /// Named filter keys (`filter[<key>]`) that resolve through something
    /// other than a plain field lookup: an aliased/dotted real field, a
    /// `oneOf` token search across several fields, a polymorphic
    /// relationship fan-out, or a caller-supplied predicate closure.
    pub fields: IndexMap<String, SearchFieldDescriptor>,
}

/// One `searchSchema`-style filter-key descriptor.
#[derive(Clone)]
pub struct SearchFieldDescriptor {
    pub target: SearchTarget,
    /// Escape hatch for a predicate `target` can't express — called with the
    /// raw filter value and ANDed into the query as-is.
    pub apply_filter: Option<ApplyFilter>,
}

impl std::fmt::Debug for SearchFieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchFieldDescriptor")
            .field("target", &self.target)
            .field("apply_filter", &self.apply_filter.as_ref().map(|_| "<closure>"))
            .finish()
    }
}

/// A caller-supplied predicate builder for a `filter[<key>]` term that no
/// declarative [`SearchTarget`] shape covers.
pub type ApplyFilter = std::sync::Arc<dyn Fn(&crate::request::FilterValue) -> jsonapi_sql::Expr + Send + Sync>;

/// What a `searchSchema` filter key actually resolves to.
#[derive(Clone, Debug)]
pub enum SearchTarget {
    /// An aliased real field, given as a dotted relationship path (e.g.
    /// `["publisher", "name"]` for a filter key named `publisherName`).
    /// Resolves exactly like a plain dotted `filter[a.b]` term.
    ActualField(Vec<String>),
    /// Match if any (or, with `match_all`, every) of `fields` contains the
    /// value as a substring. `split_by` tokenizes the raw value first (a
    /// space-separated multi-word search), in which case every token must
    /// satisfy the `fields` OR-group.
    OneOf {
        fields: Vec<Vec<String>>,
        split_by: Option<String>,
        match_all: bool,
    },
    /// Fan out across a polymorphic relationship's possible target types:
    /// `field` names the relationship, `target_fields` gives the column to
    /// match per target type (same order as the relationship's declared
    /// `target_types`).
    Polymorphic {
        field: String,
        target_fields: Vec<String>,
    },
}

/// One compiled resource: its descriptor plus derived compiler output.
#[derive(Clone, Debug)]
pub struct CompiledResource {
    pub descriptor: ResourceDescriptor,
    /// Topological order in which computed fields must be evaluated so that
    /// every field is computed after its dependencies.
    pub getter_order: Vec<String>,
    /// Precomputed join chain for every relationship name and every dotted
    /// `relationship.attribute` path that filters/sort are allowed to use.
    pub join_index: HashMap<String, JoinChain>,
}

impl CompiledResource {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.descriptor.fields.iter().find(|f| f.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.descriptor.relationships.iter().find(|r| r.name == name)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.descriptor.fields.iter().any(|f| f.column == column)
            || self.descriptor.pk_columns.iter().any(|c| c == column)
    }
}

/// One hop of a precomputed join chain: the relationship name traversed and
/// the resource type landed on.
#[derive(Clone, Debug)]
pub struct JoinHop {
    pub relationship_name: String,
    pub target_type: String,
}

/// A fully resolved chain of joins for a dotted path like `author.publisher`.
#[derive(Clone, Debug, Default)]
pub struct JoinChain {
    pub hops: Vec<JoinHop>,
}

/// The full set of compiled resources, keyed by JSON:API type name.
#[derive(Clone, Debug, Default)]
pub struct CompiledSchema {
    pub resources: IndexMap<String, CompiledResource>,
}

impl CompiledSchema {
    pub fn get(&self, type_name: &str) -> Option<&CompiledResource> {
        self.resources.get(type_name)
    }

    pub fn require(&self, type_name: &str) -> Result<&CompiledResource> {
        self.get(type_name)
            .ok_or_else(|| crate::error::Error::NotFound(format!("resource type '{type_name}'")))
    }
}

/// Thread-safe, swappable handle to the compiled schema, mirroring the
/// teacher's hot-reloadable schema cache wrapper.
#[derive(Clone)]
pub struct SchemaRegistry(Arc<tokio::sync::RwLock<Option<Arc<CompiledSchema>>>>);

impl SchemaRegistry {
    pub fn new() -> Self {
        Self(Arc::new(tokio::sync::RwLock::new(None)))
    }

    pub async fn from_descriptors(descriptors: Vec<ResourceDescriptor>) -> Result<Self> {
        let registry = Self::new();
        registry.reload(descriptors).await?;
        Ok(registry)
    }

    /// Compile and swap in a new schema. Readers holding a previously cloned
    /// `Arc<CompiledSchema>` keep using the old one until they re-fetch.
    pub async fn reload(&self, descriptors: Vec<ResourceDescriptor>) -> Result<()> {
        let compiled = compile(descriptors)?;
        let mut guard = self.0.write().await;
        *guard = Some(Arc::new(compiled));
        Ok(())
    }

    pub async fn current(&self) -> Result<Arc<CompiledSchema>> {
        self.0
            .read()
            .await
            .clone()
            .ok_or_else(|| crate::error::Error::Internal("schema not yet compiled".into()))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
