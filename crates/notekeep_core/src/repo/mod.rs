//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts (the entity store).
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes validate domain records before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod note_repo;
pub mod reference;
pub mod user_repo;
pub mod version_repo;

use crate::db::DbError;
use crate::model::entity::EntityRef;
use crate::model::note::{NoteValidationError, TagValidationError};
use crate::model::user::UserValidationError;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(EntityRef),
    /// Uniqueness constraint rejected the write.
    Conflict(String),
    /// Entity type has no backing table in this store.
    UnsupportedEntityType(String),
    NoteValidation(NoteValidationError),
    TagValidation(TagValidationError),
    UserValidation(UserValidationError),
    InvalidData(String),
}

impl RepoError {
    /// Whether the store was transiently unavailable (busy/locked).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(entity) => write!(f, "entity not found: {entity}"),
            Self::Conflict(message) => write!(f, "conflicting write: {message}"),
            Self::UnsupportedEntityType(entity_type) => {
                write!(f, "store has no table for entity type `{entity_type}`")
            }
            Self::NoteValidation(err) => write!(f, "{err}"),
            Self::TagValidation(err) => write!(f, "{err}"),
            Self::UserValidation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NoteValidation(err) => Some(err),
            Self::TagValidation(err) => Some(err),
            Self::UserValidation(err) => Some(err),
            Self::NotFound(_)
            | Self::Conflict(_)
            | Self::UnsupportedEntityType(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<NoteValidationError> for RepoError {
    fn from(value: NoteValidationError) -> Self {
        Self::NoteValidation(value)
    }
}

impl From<TagValidationError> for RepoError {
    fn from(value: TagValidationError) -> Self {
        Self::TagValidation(value)
    }
}

impl From<UserValidationError> for RepoError {
    fn from(value: UserValidationError) -> Self {
        Self::UserValidation(value)
    }
}

/// Get/put access to live aggregates of one type, used by revert.
pub trait AggregateStore<T> {
    /// Loads the live aggregate; soft-deleted aggregates count as missing.
    fn load(&self, entity_id: &str) -> RepoResult<Option<T>>;
    /// Persists the full aggregate state atomically.
    fn save(&self, entity: &T) -> RepoResult<()>;
}

pub(crate) fn to_micros(value: DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}

pub(crate) fn from_micros(column: &str, value: i64) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value).ok_or_else(|| {
        RepoError::InvalidData(format!("timestamp `{value}` out of range in {column}"))
    })
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(column: &str, value: i64) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

/// Maps a `UNIQUE` violation to `Conflict`, keeping other errors intact.
pub(crate) fn map_unique_violation(
    err: rusqlite::Error,
    message: impl FnOnce() -> String,
) -> RepoError {
    let db_err = DbError::Sqlite(err);
    if db_err.is_unique_violation() {
        RepoError::Conflict(message())
    } else {
        RepoError::Db(db_err)
    }
}
