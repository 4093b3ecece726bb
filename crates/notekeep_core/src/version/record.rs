//! Immutable version record.
//!
//! # Invariants
//! - Every persisted attribute is private and exposed read-only.
//! - The decode memo belongs to one record instance and is never shared;
//!   it does not take part in equality or serialization.

use crate::model::entity::EntityRef;
use crate::model::user::UserId;
use crate::version::codec::{DecodedFields, EncodedFields};
use crate::version::error::VersionResult;
use chrono::{DateTime, Utc};
use once_cell::unsync::OnceCell;

/// Insert payload for a new version row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub entity_ref: EntityRef,
    pub version_number: u32,
    pub fields: EncodedFields,
    pub creator: UserId,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of an entity's fields at one point in its history.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    id: i64,
    entity_ref: EntityRef,
    version_number: u32,
    fields: EncodedFields,
    creator: UserId,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    decoded: OnceCell<DecodedFields>,
}

impl VersionRecord {
    /// Rebuilds a record from its stored row id and insert payload.
    pub fn from_stored(id: i64, version: NewVersion) -> Self {
        Self {
            id,
            entity_ref: version.entity_ref,
            version_number: version.version_number,
            fields: version.fields,
            creator: version.creator,
            comment: version.comment,
            created_at: version.created_at,
            decoded: OnceCell::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn entity_ref(&self) -> &EntityRef {
        &self.entity_ref
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_ref.entity_type
    }

    pub fn version_number(&self) -> u32 {
        self.version_number
    }

    pub fn fields(&self) -> &EncodedFields {
        &self.fields
    }

    pub fn creator(&self) -> UserId {
        self.creator
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this instance already holds decoded fields.
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Returns the memoized decode, running `decode` only on first success.
    pub(crate) fn decoded_or_try_init(
        &self,
        decode: impl FnOnce() -> VersionResult<DecodedFields>,
    ) -> VersionResult<&DecodedFields> {
        self.decoded.get_or_try_init(decode)
    }
}

impl PartialEq for VersionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.entity_ref == other.entity_ref
            && self.version_number == other.version_number
            && self.fields == other.fields
            && self.creator == other.creator
            && self.comment == other.comment
            && self.created_at == other.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::{NewVersion, VersionRecord};
    use crate::model::entity::EntityRef;
    use crate::model::user::UserId;
    use crate::version::codec::{DecodedFields, EncodedFields};
    use crate::version::error::VersionError;
    use chrono::Utc;
    use std::cell::Cell;

    fn record() -> VersionRecord {
        VersionRecord::from_stored(
            1,
            NewVersion {
                entity_ref: EntityRef::new("note", "n-1"),
                version_number: 1,
                fields: EncodedFields::new(),
                creator: UserId(1),
                comment: Some("first".to_string()),
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn decode_memo_runs_once_and_skips_failed_attempts() {
        let record = record();
        let calls = Cell::new(0);

        let failed = record.decoded_or_try_init(|| {
            calls.set(calls.get() + 1);
            Err(VersionError::UnknownEntityType("note".to_string()))
        });
        assert!(failed.is_err());
        assert!(!record.is_decoded());

        for _ in 0..3 {
            record
                .decoded_or_try_init(|| {
                    calls.set(calls.get() + 1);
                    Ok(DecodedFields::default())
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 2);
        assert!(record.is_decoded());
    }

    #[test]
    fn equality_ignores_decode_memo() {
        let decoded = record();
        decoded
            .decoded_or_try_init(|| Ok(DecodedFields::default()))
            .unwrap();
        let mut fresh = decoded.clone();
        fresh.decoded = Default::default();

        assert_eq!(decoded, fresh);
        assert_eq!(fresh.comment(), Some("first"));
    }
}
