//! Error taxonomy of the versioning subsystem.

use crate::model::entity::EntityRef;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type VersionResult<T> = Result<T, VersionError>;

#[derive(Debug)]
pub enum VersionError {
    /// Entity has no identity or its type has no registered schema.
    InvalidEntity(String),
    /// No schema registered for the type tag.
    UnknownEntityType(String),
    /// Stored field name is not part of the type's current schema.
    UnknownFieldKind { entity_type: String, field: String },
    /// Value variant does not fit the declared field kind.
    FieldKindMismatch {
        entity_type: String,
        field: String,
        expected: &'static str,
    },
    /// Stored value cannot be parsed for its declared kind.
    InvalidFieldValue { field: String, value: String },
    /// Record belongs to another entity type than the one requested.
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    /// Explicit version number does not exceed the existing history.
    NonMonotonicVersion {
        entity: EntityRef,
        requested: u32,
        highest: u32,
    },
    /// Another writer stored the same number first.
    DuplicateVersion {
        entity: EntityRef,
        version_number: u32,
    },
    /// Revert target no longer exists.
    EntityNotFound(EntityRef),
    /// Transient store failure (busy/locked); never retried by the core.
    StoreUnavailable(RepoError),
    Store(RepoError),
}

impl Display for VersionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntity(reason) => write!(f, "invalid entity: {reason}"),
            Self::UnknownEntityType(entity_type) => {
                write!(f, "no schema registered for entity type `{entity_type}`")
            }
            Self::UnknownFieldKind { entity_type, field } => {
                write!(f, "entity type `{entity_type}` has no field `{field}`")
            }
            Self::FieldKindMismatch {
                entity_type,
                field,
                expected,
            } => write!(
                f,
                "field `{field}` of `{entity_type}` expects a {expected} value"
            ),
            Self::InvalidFieldValue { field, value } => {
                write!(f, "invalid stored value `{value}` for field `{field}`")
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "version belongs to `{found}`, expected `{expected}`")
            }
            Self::NonMonotonicVersion {
                entity,
                requested,
                highest,
            } => write!(
                f,
                "version {requested} for {entity} must exceed existing version {highest}"
            ),
            Self::DuplicateVersion {
                entity,
                version_number,
            } => write!(f, "version {version_number} already exists for {entity}"),
            Self::EntityNotFound(entity) => write!(f, "entity not found: {entity}"),
            Self::StoreUnavailable(err) => write!(f, "store unavailable: {err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for VersionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) | Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for VersionError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(entity) => Self::EntityNotFound(entity),
            err if err.is_unavailable() => Self::StoreUnavailable(err),
            err => Self::Store(err),
        }
    }
}
