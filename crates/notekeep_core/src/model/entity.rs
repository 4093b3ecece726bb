//! Polymorphic entity references and lifecycle value objects.
//!
//! Every versionable aggregate embeds a [`Lifecycle`] and a
//! [`SoftDeleteState`] instead of inheriting them.

use crate::model::user::UserId;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// `(type tag, identifier)` pointer to any versionable aggregate.
///
/// The identifier is opaque: a numeric id or a UUID in text form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Creation/modification timestamps shared by aggregates.
///
/// Both are kept at microsecond precision, the precision they are stored and
/// encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Set once at creation.
    pub created: DateTime<Utc>,
    /// Last mutation time; `None` until the first update.
    pub modified: Option<DateTime<Utc>>,
}

impl Lifecycle {
    pub fn started_at(created: DateTime<Utc>) -> Self {
        Self {
            created: created.trunc_subsecs(6),
            modified: None,
        }
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.modified = Some(at.trunc_subsecs(6));
    }
}

/// Soft-delete tombstone shared by aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteState {
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<UserId>,
}

impl SoftDeleteState {
    /// Marks the owner as deleted. Repeated calls keep the first tombstone.
    pub fn mark_deleted(&mut self, by: UserId, at: DateTime<Utc>) {
        if self.is_deleted {
            return;
        }
        self.is_deleted = true;
        self.deleted_at = Some(at.trunc_subsecs(6));
        self.deleted_by = Some(by);
    }
}
