//! Note/tag aggregate.
//!
//! # Responsibility
//! - Define the note record, its tags and their validation rules.
//! - Expose note fields to the versioning codec by name.
//!
//! # Invariants
//! - Tag names attached to one note are unique (exact string match).
//! - `lifecycle.created` never changes after creation.
//! - The aggregate has no actor concept; callers check authorship.

use crate::model::entity::{Lifecycle, SoftDeleteState};
use crate::model::user::UserId;
use crate::version::error::{VersionError, VersionResult};
use crate::version::field::{
    kind_mismatch, FieldKind, FieldValue, ResolvedRef, TypeSchema, Versionable,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const TITLE_MAX_CHARS: usize = 40;
pub const TAG_NAME_MAX_CHARS: usize = 20;

/// Stable identifier of a note.
pub type NoteId = Uuid;

/// Identifier of a shared tag row.
pub type TagId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    /// `None` only when the author's identity no longer exists.
    pub author: Option<UserId>,
    pub title: String,
    pub body: String,
    /// Attachment order is preserved.
    pub tags: Vec<Tag>,
    pub public: bool,
    pub lifecycle: Lifecycle,
    pub deletion: SoftDeleteState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    EmptyTitle,
    TitleTooLong { max: usize, actual: usize },
    DuplicateTag(String),
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "note title cannot be empty"),
            Self::TitleTooLong { max, actual } => {
                write!(f, "note title is {actual} chars, at most {max} allowed")
            }
            Self::DuplicateTag(name) => write!(f, "tag `{name}` attached more than once"),
        }
    }
}

impl Error for NoteValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValidationError {
    Empty,
    TooLong { max: usize, actual: usize },
}

impl Display for TagValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "tag name cannot be empty"),
            Self::TooLong { max, actual } => {
                write!(f, "tag name is {actual} chars, at most {max} allowed")
            }
        }
    }
}

impl Error for TagValidationError {}

impl Note {
    /// Creates an untagged private note with a generated id.
    pub fn new(
        author: UserId,
        title: impl Into<String>,
        body: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), author, title, body, created)
    }

    /// Creates a note with a caller-provided id (import paths).
    pub fn with_id(
        id: NoteId,
        author: UserId,
        title: impl Into<String>,
        body: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            author: Some(author),
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            public: false,
            lifecycle: Lifecycle::started_at(created),
            deletion: SoftDeleteState::default(),
        }
    }

    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.title.trim().is_empty() {
            return Err(NoteValidationError::EmptyTitle);
        }
        let title_chars = self.title.chars().count();
        if title_chars > TITLE_MAX_CHARS {
            return Err(NoteValidationError::TitleTooLong {
                max: TITLE_MAX_CHARS,
                actual: title_chars,
            });
        }
        for (index, tag) in self.tags.iter().enumerate() {
            if self.tags[..index].iter().any(|seen| seen.name == tag.name) {
                return Err(NoteValidationError::DuplicateTag(tag.name.clone()));
            }
        }
        Ok(())
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }

    /// Attaches `tag` unless a tag with the same name is already present.
    ///
    /// Returns whether the tag set changed.
    pub fn attach_tag(&mut self, tag: Tag) -> bool {
        if self.has_tag(&tag.name) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Detaches the tag named `name`. Returns whether the tag set changed.
    pub fn detach_tag(&mut self, name: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|tag| tag.name != name);
        self.tags.len() != before
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|tag| tag.name.as_str()).collect()
    }

    pub fn is_authored_by(&self, user: UserId) -> bool {
        self.author == Some(user)
    }
}

/// Trims a tag name and checks its length.
pub fn normalize_tag_name(name: &str) -> Result<String, TagValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TagValidationError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars > TAG_NAME_MAX_CHARS {
        return Err(TagValidationError::TooLong {
            max: TAG_NAME_MAX_CHARS,
            actual: chars,
        });
    }
    Ok(trimmed.to_string())
}

impl Versionable for Note {
    const ENTITY_TYPE: &'static str = "note";

    fn schema() -> TypeSchema {
        TypeSchema::new(Self::ENTITY_TYPE)
            .field("id", FieldKind::Identifier)
            .field("author", FieldKind::Reference { target: "user" })
            .field("title", FieldKind::Scalar)
            .field("body", FieldKind::Scalar)
            .field("tags", FieldKind::ReferenceCollection { target: "tag" })
            .field("created", FieldKind::Timestamp)
            .field("public", FieldKind::Boolean)
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "id" => FieldValue::Identifier(self.id),
            "author" => FieldValue::Reference(
                self.author
                    .map(|author| ResolvedRef::id_only(author.to_string())),
            ),
            "title" => FieldValue::Text(self.title.clone()),
            "body" => FieldValue::Text(self.body.clone()),
            "tags" => FieldValue::References(
                self.tags
                    .iter()
                    .map(|tag| ResolvedRef::labeled(tag.id.to_string(), tag.name.clone()))
                    .collect(),
            ),
            "created" => FieldValue::Timestamp(Some(self.lifecycle.created)),
            "public" => FieldValue::Bool(self.public),
            _ => return None,
        };
        Some(value)
    }

    fn apply_field(&mut self, name: &str, value: FieldValue) -> VersionResult<()> {
        match (name, value) {
            ("id", FieldValue::Identifier(id)) => self.id = id,
            ("author", FieldValue::Reference(author)) => {
                self.author = author
                    .map(|reference| parse_integer_id("author", &reference.id).map(UserId))
                    .transpose()?;
            }
            ("title", FieldValue::Text(title)) => self.title = title,
            ("body", FieldValue::Text(body)) => self.body = body,
            ("tags", FieldValue::References(tags)) => {
                let mut rebuilt = Vec::with_capacity(tags.len());
                for reference in tags {
                    let id = parse_integer_id("tags", &reference.id)?;
                    rebuilt.push(Tag {
                        id,
                        name: reference.label.unwrap_or_default(),
                    });
                }
                self.tags = rebuilt;
            }
            ("created", FieldValue::Timestamp(Some(created))) => self.lifecycle.created = created,
            ("created", FieldValue::Timestamp(None)) => {}
            ("public", FieldValue::Bool(public)) => self.public = public,
            (field, _) => {
                return Err(match Self::schema().kind_of(field) {
                    Some(kind) => kind_mismatch(Self::ENTITY_TYPE, field, kind),
                    None => VersionError::UnknownFieldKind {
                        entity_type: Self::ENTITY_TYPE.to_string(),
                        field: field.to_string(),
                    },
                });
            }
        }
        Ok(())
    }

    fn blank(entity_id: &str) -> VersionResult<Self> {
        let id = Uuid::parse_str(entity_id).map_err(|_| VersionError::InvalidFieldValue {
            field: "id".to_string(),
            value: entity_id.to_string(),
        })?;
        Ok(Self {
            id,
            author: None,
            title: String::new(),
            body: String::new(),
            tags: Vec::new(),
            public: false,
            lifecycle: Lifecycle::started_at(DateTime::<Utc>::default()),
            deletion: SoftDeleteState::default(),
        })
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.lifecycle.touch(at);
    }
}

fn parse_integer_id(field: &str, value: &str) -> VersionResult<i64> {
    value
        .parse::<i64>()
        .map_err(|_| VersionError::InvalidFieldValue {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{normalize_tag_name, Note, NoteValidationError, Tag, TagValidationError};
    use crate::model::user::UserId;
    use crate::version::error::VersionError;
    use crate::version::codec::{parse_timestamp, FieldCodec};
    use crate::version::field::{FieldValue, SchemaRegistry, Versionable};
    use chrono::{TimeZone, Timelike, Utc};

    fn note() -> Note {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        Note::new(UserId(1), "Shopping", "milk", created)
    }

    #[test]
    fn attach_tag_ignores_duplicate_names() {
        let mut note = note();
        assert!(note.attach_tag(Tag {
            id: 1,
            name: "home".to_string()
        }));
        assert!(!note.attach_tag(Tag {
            id: 2,
            name: "home".to_string()
        }));
        assert_eq!(note.tag_names(), vec!["home"]);
        assert!(note.detach_tag("home"));
        assert!(!note.detach_tag("home"));
    }

    #[test]
    fn has_tag_is_exact_match() {
        let mut note = note();
        note.attach_tag(Tag {
            id: 1,
            name: "Work".to_string(),
        });
        assert!(note.has_tag("Work"));
        assert!(!note.has_tag("work"));
    }

    #[test]
    fn validate_enforces_title_rules() {
        let mut note = note();
        note.title = "x".repeat(41);
        assert_eq!(
            note.validate(),
            Err(NoteValidationError::TitleTooLong {
                max: 40,
                actual: 41
            })
        );
        note.title = "   ".to_string();
        assert_eq!(note.validate(), Err(NoteValidationError::EmptyTitle));
    }

    #[test]
    fn normalize_tag_name_trims_and_bounds_length() {
        assert_eq!(normalize_tag_name("  errands ").unwrap(), "errands");
        assert_eq!(normalize_tag_name(" "), Err(TagValidationError::Empty));
        assert!(matches!(
            normalize_tag_name(&"t".repeat(21)),
            Err(TagValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn apply_field_rejects_mismatched_and_unknown_fields() {
        let mut note = note();
        let err = note
            .apply_field("title", FieldValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, VersionError::FieldKindMismatch { .. }));

        let err = note
            .apply_field("color", FieldValue::Text("red".to_string()))
            .unwrap_err();
        assert!(matches!(err, VersionError::UnknownFieldKind { .. }));
    }

    #[test]
    fn blank_keeps_identity_only() {
        let source = note();
        let blank = Note::blank(&source.entity_id()).unwrap();
        assert_eq!(blank.id, source.id);
        assert!(blank.author.is_none());
        assert!(blank.title.is_empty());
        assert!(Note::blank("not-a-uuid").is_err());
    }

    #[test]
    fn created_timestamp_survives_encoding_at_nanosecond_input() {
        let created = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap()
            .with_nanosecond(987_654_321)
            .unwrap();
        let note = Note::new(UserId(1), "Shopping", "milk", created);

        let registry = SchemaRegistry::with_defaults();
        let fields = FieldCodec::new(&registry).encode(&note).unwrap();
        let stored = fields.get("created").and_then(|value| value.as_str()).unwrap();

        assert_eq!(parse_timestamp(stored), Some(note.lifecycle.created));
        assert_eq!(note.lifecycle.created.nanosecond(), 987_654_000);
    }
}
