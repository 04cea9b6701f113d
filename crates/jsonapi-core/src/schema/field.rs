//! Attribute field descriptors.

use serde_json::Value;

/// The declared storage type of an attribute, used to coerce and validate
/// incoming JSON values during `schemaValidate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    Time,
    Timestamp,
    Id,
    Blob,
    Json,
    Array,
    File,
}

/// Visibility of an attribute in `data.attributes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hidden {
    /// Always serialized.
    Never,
    /// Never serialized, even if a sparse fieldset names it explicitly.
    Always,
    /// Omitted unless a sparse fieldset explicitly requests it by name.
    Normally,
}

/// One JSON:API attribute on a resource.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    /// Name exposed under `data.attributes`.
    pub name: String,
    /// Backing column name. For computed fields this is the alias the
    /// computation is projected under.
    pub column: String,
    pub field_type: FieldType,
    /// Must be present (or have a `default_to`) on create.
    pub required: bool,
    /// Whether a JSON `null` is an acceptable value.
    pub nullable: bool,
    /// Value substituted when the attribute is absent from a create body.
    pub default_to: Option<Value>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enum_values: Option<Vec<String>>,
    /// Enforced by the backing table's unique constraint; surfaces as a
    /// `conflict` error from the storage adapter, not pre-validated here.
    pub unique: bool,
    /// Whether this column carries an index, a precondition for appearing
    /// as the terminal field of a cross-table filter or sort path.
    pub indexed: bool,
    pub hidden: Hidden,
    /// Never accepted on create/update, even if present in the request body.
    pub read_only: bool,
    /// Present only when this field is derived rather than stored.
    pub computed: Option<ComputedField>,
}

impl FieldDescriptor {
    /// A plain optional string field, the common case in tests and
    /// examples; callers needing constraints build the struct directly.
    pub fn stored(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            field_type: FieldType::String,
            required: false,
            nullable: true,
            default_to: None,
            max_length: None,
            min: None,
            max: None,
            enum_values: None,
            unique: false,
            indexed: false,
            hidden: Hidden::Never,
            read_only: false,
            computed: None,
        }
    }

    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    /// A derived field projected by `expression`, read-only and recomputed
    /// from `depends_on` in topological order at serialization time.
    pub fn computed(
        name: impl Into<String>,
        column: impl Into<String>,
        depends_on: Vec<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            computed: Some(ComputedField { depends_on, expression: expression.into() }),
            read_only: true,
            ..Self::stored(name, column)
        }
    }

    /// Whether this field may terminate a cross-table `filter`/`sort` path,
    /// per the invariant that every dotted search path ends on an indexed
    /// column.
    pub fn is_searchable_remote(&self) -> bool {
        self.indexed
    }
}

/// A field whose value is derived from other fields on the same resource
/// rather than read directly off a column.
#[derive(Clone, Debug)]
pub struct ComputedField {
    /// Names of other fields (stored or computed) this one reads.
    pub depends_on: Vec<String>,
    /// SQL expression template used to project the value, e.g.
    /// `"price * quantity"`. Column names inside must already be
    /// `escape_ident`-safe identifiers resolved by the compiler.
    pub expression: String,
}
