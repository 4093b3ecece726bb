//! Field codec between typed aggregates and the flat stored mapping.
//!
//! # Responsibility
//! - Encode every declared field of an entity into a JSON-compatible,
//!   insertion-ordered `name -> value` map.
//! - Decode a stored map back into typed values using the target type's
//!   registered field kinds, resolving references through the store.
//!
//! # Invariants
//! - Stored maps carry no per-field type metadata; kinds always come from
//!   the `SchemaRegistry` at decode time.
//! - Booleans are stored as `"True"` / `"False"`; decode maps exactly
//!   `"True"` to `true` and anything else to `false`.
//! - Absent timestamps and references are stored as JSON `null`, never as an
//!   empty string.
//! - Unresolvable references are dropped from the decoded result, never
//!   raised as errors.

use crate::repo::reference::ReferenceResolver;
use crate::version::error::{VersionError, VersionResult};
use crate::version::field::{
    kind_mismatch, FieldDescriptor, FieldKind, FieldValue, ResolvedRef, SchemaRegistry,
    Versionable,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

/// Stored representation of a version's fields.
pub type EncodedFields = serde_json::Map<String, Value>;

/// Timestamp layout written by `encode`: ISO-8601 with microseconds and a
/// `+HH:MM` offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

const TRUE_LITERAL: &str = "True";
const FALSE_LITERAL: &str = "False";

/// Decoded values in stored field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFields {
    values: Vec<(String, FieldValue)>,
}

impl DecodedFields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values
            .iter()
            .map(|(field, value)| (field.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Writes every decoded value onto `entity`, in stored order.
    pub fn apply_to<T: Versionable>(&self, entity: &mut T) -> VersionResult<()> {
        for (name, value) in &self.values {
            entity.apply_field(name, value.clone())?;
        }
        Ok(())
    }
}

/// Stateless codec bound to a schema registry.
#[derive(Debug, Clone, Copy)]
pub struct FieldCodec<'a> {
    schemas: &'a SchemaRegistry,
}

impl<'a> FieldCodec<'a> {
    pub fn new(schemas: &'a SchemaRegistry) -> Self {
        Self { schemas }
    }

    /// Encodes all declared fields of `entity`.
    ///
    /// Pure: no store access.
    ///
    /// # Errors
    /// - `UnknownEntityType` when `T` is not registered.
    /// - `FieldKindMismatch` when the entity reports a value that does not
    ///   fit the declared kind, or no value for a declared field.
    pub fn encode<T: Versionable>(&self, entity: &T) -> VersionResult<EncodedFields> {
        let schema = self
            .schemas
            .get(T::ENTITY_TYPE)
            .ok_or_else(|| VersionError::UnknownEntityType(T::ENTITY_TYPE.to_string()))?;

        let mut fields = EncodedFields::new();
        for descriptor in schema.fields() {
            let value = entity
                .read_field(descriptor.name)
                .ok_or_else(|| kind_mismatch(T::ENTITY_TYPE, descriptor.name, descriptor.kind))?;
            let encoded = encode_value(T::ENTITY_TYPE, descriptor, value)?;
            fields.insert(descriptor.name.to_string(), encoded);
        }
        Ok(fields)
    }

    /// Decodes a stored map against `entity_type`'s current schema.
    ///
    /// Field names are checked before any reference is resolved, so a map
    /// written under an incompatible schema fails without store round-trips.
    ///
    /// # Errors
    /// - `UnknownEntityType` / `UnknownFieldKind` for schema mismatches.
    /// - `InvalidFieldValue` for malformed timestamps or identifiers.
    /// - Store failures raised while resolving references.
    pub fn decode<R: ReferenceResolver + ?Sized>(
        &self,
        entity_type: &str,
        fields: &EncodedFields,
        resolver: &R,
    ) -> VersionResult<DecodedFields> {
        let schema = self
            .schemas
            .get(entity_type)
            .ok_or_else(|| VersionError::UnknownEntityType(entity_type.to_string()))?;

        let mut typed = Vec::with_capacity(fields.len());
        for (name, raw) in fields {
            let kind = schema
                .kind_of(name)
                .ok_or_else(|| VersionError::UnknownFieldKind {
                    entity_type: entity_type.to_string(),
                    field: name.clone(),
                })?;
            typed.push((name, kind, raw));
        }

        let mut decoded = DecodedFields::default();
        for (name, kind, raw) in typed {
            if let Some(value) = decode_value(entity_type, name, kind, raw, resolver)? {
                decoded.values.push((name.clone(), value));
            }
        }
        Ok(decoded)
    }
}

/// Formats a timestamp the way stored versions expect.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp; offsets are normalized to UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn encode_value(
    entity_type: &str,
    descriptor: &FieldDescriptor,
    value: FieldValue,
) -> VersionResult<Value> {
    let encoded = match (descriptor.kind, value) {
        (FieldKind::Scalar, FieldValue::Text(text)) => Value::String(text),
        (FieldKind::Reference { .. }, FieldValue::Reference(reference)) => {
            reference.map_or(Value::Null, |reference| Value::String(reference.id))
        }
        (FieldKind::ReferenceCollection { .. }, FieldValue::References(references)) => {
            Value::Array(
                references
                    .into_iter()
                    .map(|reference| Value::String(reference.id))
                    .collect(),
            )
        }
        (FieldKind::Timestamp, FieldValue::Timestamp(timestamp)) => {
            timestamp.map_or(Value::Null, |at| Value::String(format_timestamp(at)))
        }
        (FieldKind::Boolean, FieldValue::Bool(flag)) => {
            Value::String(if flag { TRUE_LITERAL } else { FALSE_LITERAL }.to_string())
        }
        (FieldKind::Identifier, FieldValue::Identifier(id)) => {
            Value::String(id.hyphenated().to_string())
        }
        (kind, _) => return Err(kind_mismatch(entity_type, descriptor.name, kind)),
    };
    Ok(encoded)
}

fn decode_value<R: ReferenceResolver + ?Sized>(
    entity_type: &str,
    name: &str,
    kind: FieldKind,
    raw: &Value,
    resolver: &R,
) -> VersionResult<Option<FieldValue>> {
    let value = match kind {
        FieldKind::Scalar => stored_text(raw).map(FieldValue::Text),
        FieldKind::Boolean => Some(FieldValue::Bool(
            matches!(raw, Value::String(text) if text == TRUE_LITERAL),
        )),
        FieldKind::Identifier => match stored_text(raw) {
            Some(text) => {
                let id = Uuid::parse_str(&text).map_err(|_| invalid_value(name, raw))?;
                Some(FieldValue::Identifier(id))
            }
            None => None,
        },
        FieldKind::Timestamp => match stored_text(raw) {
            Some(text) if !text.is_empty() => {
                let at = parse_timestamp(&text).ok_or_else(|| invalid_value(name, raw))?;
                Some(FieldValue::Timestamp(Some(at)))
            }
            _ => Some(FieldValue::Timestamp(None)),
        },
        FieldKind::Reference { target } => {
            let Some(id) = stored_text(raw) else {
                return Ok(Some(FieldValue::Reference(None)));
            };
            let resolved = resolver.resolve(target, std::slice::from_ref(&id))?;
            match resolved.into_iter().next() {
                Some(reference) => Some(FieldValue::Reference(Some(reference))),
                None => {
                    warn!(
                        "event=field_decode module=version status=dropped entity_type={entity_type} field={name} target={target} reason=reference_unresolvable"
                    );
                    None
                }
            }
        }
        FieldKind::ReferenceCollection { target } => {
            let ids = stored_id_list(name, raw)?;
            let resolved: Vec<ResolvedRef> = if ids.is_empty() {
                Vec::new()
            } else {
                resolver.resolve(target, &ids)?
            };
            if resolved.len() < ids.len() {
                debug!(
                    "event=field_decode module=version status=partial entity_type={entity_type} field={name} target={target} requested={} resolved={}",
                    ids.len(),
                    resolved.len()
                );
            }
            Some(FieldValue::References(resolved))
        }
    };
    Ok(value)
}

fn stored_text(raw: &Value) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn stored_id_list(name: &str, raw: &Value) -> VersionResult<Vec<String>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                Value::Number(number) => Ok(number.to_string()),
                _ => Err(invalid_value(name, raw)),
            })
            .collect(),
        _ => Err(invalid_value(name, raw)),
    }
}

fn invalid_value(name: &str, raw: &Value) -> VersionError {
    VersionError::InvalidFieldValue {
        field: name.to_string(),
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp, EncodedFields, FieldCodec};
    use crate::repo::reference::ReferenceResolver;
    use crate::repo::RepoResult;
    use crate::version::error::{VersionError, VersionResult};
    use crate::version::field::{
        kind_mismatch, FieldKind, FieldValue, ResolvedRef, SchemaRegistry, TypeSchema,
        Versionable,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    struct Post {
        id: Uuid,
        title: String,
        published: Option<DateTime<Utc>>,
        archived: bool,
        owner: Option<String>,
        labels: Vec<String>,
    }

    impl Versionable for Post {
        const ENTITY_TYPE: &'static str = "post";

        fn schema() -> TypeSchema {
            TypeSchema::new("post")
                .field("id", FieldKind::Identifier)
                .field("title", FieldKind::Scalar)
                .field("published", FieldKind::Timestamp)
                .field("archived", FieldKind::Boolean)
                .field("owner", FieldKind::Reference { target: "user" })
                .field("labels", FieldKind::ReferenceCollection { target: "tag" })
        }

        fn entity_id(&self) -> String {
            self.id.to_string()
        }

        fn read_field(&self, name: &str) -> Option<FieldValue> {
            let value = match name {
                "id" => FieldValue::Identifier(self.id),
                "title" => FieldValue::Text(self.title.clone()),
                "published" => FieldValue::Timestamp(self.published),
                "archived" => FieldValue::Bool(self.archived),
                "owner" => FieldValue::Reference(self.owner.clone().map(ResolvedRef::id_only)),
                "labels" => FieldValue::References(
                    self.labels.iter().cloned().map(ResolvedRef::id_only).collect(),
                ),
                _ => return None,
            };
            Some(value)
        }

        fn apply_field(&mut self, name: &str, value: FieldValue) -> VersionResult<()> {
            match (name, value) {
                ("id", FieldValue::Identifier(id)) => self.id = id,
                ("title", FieldValue::Text(title)) => self.title = title,
                ("published", FieldValue::Timestamp(at)) => self.published = at,
                ("archived", FieldValue::Bool(flag)) => self.archived = flag,
                ("owner", FieldValue::Reference(owner)) => {
                    self.owner = owner.map(|reference| reference.id)
                }
                ("labels", FieldValue::References(labels)) => {
                    self.labels = labels.into_iter().map(|reference| reference.id).collect()
                }
                (field, _) => {
                    let kind = Self::schema().kind_of(field).unwrap_or(FieldKind::Scalar);
                    return Err(kind_mismatch(Self::ENTITY_TYPE, field, kind));
                }
            }
            Ok(())
        }

        fn blank(entity_id: &str) -> VersionResult<Self> {
            Ok(Self {
                id: Uuid::parse_str(entity_id).map_err(|_| VersionError::InvalidFieldValue {
                    field: "id".to_string(),
                    value: entity_id.to_string(),
                })?,
                title: String::new(),
                published: None,
                archived: false,
                owner: None,
                labels: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct MapResolver {
        known: BTreeMap<&'static str, Vec<&'static str>>,
        calls: Cell<usize>,
    }

    impl MapResolver {
        fn with(mut self, entity_type: &'static str, ids: &[&'static str]) -> Self {
            self.known.insert(entity_type, ids.to_vec());
            self
        }
    }

    impl ReferenceResolver for MapResolver {
        fn resolve(&self, entity_type: &str, ids: &[String]) -> RepoResult<Vec<ResolvedRef>> {
            self.calls.set(self.calls.get() + 1);
            let known = self.known.get(entity_type).cloned().unwrap_or_default();
            Ok(ids
                .iter()
                .filter(|id| known.contains(&id.as_str()))
                .map(|id| ResolvedRef::labeled(id.clone(), format!("label-{id}")))
                .collect())
        }
    }

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register::<Post>();
        registry
    }

    fn sample_post() -> Post {
        Post {
            id: Uuid::parse_str("6f1c2a8e-2b0a-4d7e-9a4b-1f2e3d4c5b6a").unwrap(),
            title: "Release notes".to_string(),
            published: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()),
            archived: true,
            owner: Some("7".to_string()),
            labels: vec!["3".to_string(), "1".to_string()],
        }
    }

    #[test]
    fn encode_writes_every_declared_field_in_schema_order() {
        let registry = registry();
        let fields = FieldCodec::new(&registry).encode(&sample_post()).unwrap();

        let names: Vec<_> = fields.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["id", "title", "published", "archived", "owner", "labels"]
        );
        assert_eq!(fields["id"], json!("6f1c2a8e-2b0a-4d7e-9a4b-1f2e3d4c5b6a"));
        assert_eq!(fields["published"], json!("2024-03-01T12:30:45.000000+00:00"));
        assert_eq!(fields["archived"], json!("True"));
        assert_eq!(fields["owner"], json!("7"));
        assert_eq!(fields["labels"], json!(["3", "1"]));
    }

    #[test]
    fn encode_writes_null_for_absent_timestamp_and_reference() {
        let registry = registry();
        let mut post = sample_post();
        post.published = None;
        post.owner = None;
        post.archived = false;

        let fields = FieldCodec::new(&registry).encode(&post).unwrap();
        assert_eq!(fields["published"], Value::Null);
        assert_eq!(fields["owner"], Value::Null);
        assert_eq!(fields["archived"], json!("False"));
    }

    #[test]
    fn decode_then_apply_reproduces_entity() {
        let registry = registry();
        let codec = FieldCodec::new(&registry);
        let resolver = MapResolver::default()
            .with("user", &["7"])
            .with("tag", &["1", "3"]);
        let post = sample_post();

        let fields = codec.encode(&post).unwrap();
        let decoded = codec.decode("post", &fields, &resolver).unwrap();
        let mut rebuilt = Post::blank(&post.entity_id()).unwrap();
        decoded.apply_to(&mut rebuilt).unwrap();

        assert_eq!(rebuilt, post);
    }

    #[test]
    fn decode_maps_only_exact_true_literal_to_true() {
        let registry = registry();
        let codec = FieldCodec::new(&registry);
        let resolver = MapResolver::default();

        for (raw, expected) in [
            (json!("True"), true),
            (json!("true"), false),
            (json!("yes"), false),
            (Value::Null, false),
        ] {
            let mut fields = EncodedFields::new();
            fields.insert("archived".to_string(), raw);
            let decoded = codec.decode("post", &fields, &resolver).unwrap();
            assert_eq!(decoded.get("archived"), Some(&FieldValue::Bool(expected)));
        }
    }

    #[test]
    fn decode_drops_unresolvable_reference_and_filters_collection() {
        let registry = registry();
        let codec = FieldCodec::new(&registry);
        let resolver = MapResolver::default().with("tag", &["1"]);

        let fields = codec.encode(&sample_post()).unwrap();
        let decoded = codec.decode("post", &fields, &resolver).unwrap();

        assert!(!decoded.contains("owner"));
        assert_eq!(
            decoded.get("labels"),
            Some(&FieldValue::References(vec![ResolvedRef::labeled(
                "1", "label-1"
            )]))
        );
        assert_eq!(decoded.get("title"), Some(&FieldValue::Text("Release notes".to_string())));
    }

    #[test]
    fn decode_rejects_unknown_field_before_resolving_references() {
        let registry = registry();
        let codec = FieldCodec::new(&registry);
        let resolver = MapResolver::default().with("user", &["7"]);

        let mut fields = codec.encode(&sample_post()).unwrap();
        fields.insert("subtitle".to_string(), json!("gone"));

        let err = codec.decode("post", &fields, &resolver).unwrap_err();
        assert!(matches!(
            err,
            VersionError::UnknownFieldKind { ref field, .. } if field == "subtitle"
        ));
        assert_eq!(resolver.calls.get(), 0);
    }

    #[test]
    fn decode_rejects_unregistered_type_and_malformed_values() {
        let registry = registry();
        let codec = FieldCodec::new(&registry);
        let resolver = MapResolver::default();

        let err = codec
            .decode("page", &EncodedFields::new(), &resolver)
            .unwrap_err();
        assert!(matches!(err, VersionError::UnknownEntityType(_)));

        let mut fields = EncodedFields::new();
        fields.insert("id".to_string(), json!("not-a-uuid"));
        let err = codec.decode("post", &fields, &resolver).unwrap_err();
        assert!(matches!(err, VersionError::InvalidFieldValue { ref field, .. } if field == "id"));

        let mut fields = EncodedFields::new();
        fields.insert("published".to_string(), json!("yesterday"));
        let err = codec.decode("post", &fields, &resolver).unwrap_err();
        assert!(
            matches!(err, VersionError::InvalidFieldValue { ref field, .. } if field == "published")
        );
    }

    #[test]
    fn empty_timestamp_decodes_as_absent() {
        let registry = registry();
        let codec = FieldCodec::new(&registry);
        let mut fields = EncodedFields::new();
        fields.insert("published".to_string(), json!(""));

        let decoded = codec
            .decode("post", &fields, &MapResolver::default())
            .unwrap();
        assert_eq!(decoded.get("published"), Some(&FieldValue::Timestamp(None)));
    }

    #[test]
    fn timestamp_parse_accepts_other_offsets_and_normalizes_to_utc() {
        let parsed = parse_timestamp("2024-03-01T14:30:45.250000+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2024-03-01T12:30:45.250000+00:00");
        assert!(parse_timestamp("2024-03-01").is_none());
    }
}
