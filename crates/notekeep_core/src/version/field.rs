//! Field descriptors, decoded values and the per-type schema registry.
//!
//! # Responsibility
//! - Describe each versionable type as an ordered table of
//!   `field name -> kind`, registered explicitly at startup.
//! - Define the `Versionable` contract aggregates implement so the codec can
//!   read and write their fields by name.
//!
//! # Invariants
//! - Field order in a `TypeSchema` is the order fields are encoded in.
//! - A type tag is registered at most once per registry.

use crate::model::entity::EntityRef;
use crate::version::error::{VersionError, VersionResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Storage kind of one versioned field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Text or number, stored as its string form.
    Scalar,
    /// Single reference to another entity type.
    Reference { target: &'static str },
    /// Many-to-many references to another entity type.
    ReferenceCollection { target: &'static str },
    Timestamp,
    Boolean,
    /// The entity's own UUID.
    Identifier,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Reference { .. } => "reference",
            Self::ReferenceCollection { .. } => "reference_collection",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
            Self::Identifier => "identifier",
        }
    }
}

/// Referenced entity as seen by the codec.
///
/// `label` carries the referenced entity's display name (tag name, username,
/// note title) when known; encoding only ever looks at `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub id: String,
    pub label: Option<String>,
}

impl ResolvedRef {
    pub fn id_only(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }

    pub fn labeled(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: Some(label.into()),
        }
    }
}

/// Typed value of one field, read from a live entity or produced by decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Timestamp(Option<DateTime<Utc>>),
    Identifier(Uuid),
    Reference(Option<ResolvedRef>),
    References(Vec<ResolvedRef>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Ordered field table for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSchema {
    entity_type: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl TypeSchema {
    pub fn new(entity_type: &'static str) -> Self {
        Self {
            entity_type,
            fields: Vec::new(),
        }
    }

    /// Appends one field. A repeated name replaces the earlier kind in place.
    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.fields.push(FieldDescriptor { name, kind }),
        }
        self
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.kind)
    }
}

/// Registry of field tables keyed by entity type tag.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<&'static str, TypeSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every versionable aggregate this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<crate::model::note::Note>();
        registry
    }

    /// Registers `T::schema()`, replacing any previous table for the tag.
    pub fn register<T: Versionable>(&mut self) -> &mut Self {
        self.register_schema(T::schema())
    }

    pub fn register_schema(&mut self, schema: TypeSchema) -> &mut Self {
        self.schemas.insert(schema.entity_type(), schema);
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<&TypeSchema> {
        self.schemas.get(entity_type)
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.schemas.contains_key(entity_type)
    }
}

/// Aggregate whose state can be snapshotted into version records.
///
/// Implementors expose their fields by name instead of relying on runtime
/// reflection; the codec drives both directions through the registered
/// `TypeSchema`.
pub trait Versionable: Sized {
    /// Type tag stored in `EntityRef::entity_type`.
    const ENTITY_TYPE: &'static str;

    /// Field table registered for this type.
    fn schema() -> TypeSchema;

    /// Identifier in its stored string form. Empty means "not persisted".
    fn entity_id(&self) -> String;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::ENTITY_TYPE, self.entity_id())
    }

    /// Current value of a declared field, `None` if the type has no such
    /// field.
    fn read_field(&self, name: &str) -> Option<FieldValue>;

    /// Overwrites one field with a decoded value.
    ///
    /// # Errors
    /// - `FieldKindMismatch` when the value variant does not fit the field.
    /// - `UnknownFieldKind` when the type has no such field.
    fn apply_field(&mut self, name: &str, value: FieldValue) -> VersionResult<()>;

    /// Empty instance carrying only the identity, used as the base of a
    /// reconstructed view.
    fn blank(entity_id: &str) -> VersionResult<Self>;

    /// Records a mutation time on the aggregate lifecycle, if it has one.
    fn touch(&mut self, _at: DateTime<Utc>) {}
}

/// Shorthand for the `FieldKindMismatch` error raised by `apply_field`.
pub fn kind_mismatch(entity_type: &str, field: &str, expected: FieldKind) -> VersionError {
    VersionError::FieldKindMismatch {
        entity_type: entity_type.to_string(),
        field: field.to_string(),
        expected: expected.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldKind, SchemaRegistry, TypeSchema};

    #[test]
    fn schema_keeps_declaration_order_and_replaces_duplicates() {
        let schema = TypeSchema::new("post")
            .field("title", FieldKind::Scalar)
            .field("published", FieldKind::Timestamp)
            .field("title", FieldKind::Boolean);

        let names: Vec<_> = schema.fields().iter().map(|field| field.name).collect();
        assert_eq!(names, vec!["title", "published"]);
        assert_eq!(schema.kind_of("title"), Some(FieldKind::Boolean));
        assert_eq!(schema.kind_of("missing"), None);
    }

    #[test]
    fn default_registry_knows_notes() {
        let registry = SchemaRegistry::with_defaults();
        assert!(registry.contains("note"));
        assert!(!registry.contains("post"));
        assert_eq!(
            registry.get("note").and_then(|schema| schema.kind_of("tags")),
            Some(FieldKind::ReferenceCollection { target: "tag" })
        );
    }
}
