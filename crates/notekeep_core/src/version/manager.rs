//! Version manager: create, reconstruct and revert snapshots.
//!
//! # Responsibility
//! - Assign per-entity version numbers and persist encoded snapshots.
//! - Rebuild transient entity views from stored records.
//! - Apply a stored snapshot onto the live aggregate.
//!
//! # Invariants
//! - Number assignment (read highest, write next) runs under the entity's
//!   lock from `EntityLocks`, as does revert's load-apply-save.
//! - Sequential `create_version` calls without an explicit number yield
//!   1, 2, 3, ... for one entity.
//! - Revert never creates a version record.
//! - Store failures are propagated unchanged; nothing is retried here.

use crate::context::CoreContext;
use crate::model::entity::EntityRef;
use crate::model::user::UserId;
use crate::repo::reference::ReferenceResolver;
use crate::repo::version_repo::VersionRepository;
use crate::repo::{AggregateStore, RepoError};
use crate::version::codec::{DecodedFields, FieldCodec};
use crate::version::error::{VersionError, VersionResult};
use crate::version::field::Versionable;
use crate::version::record::{NewVersion, VersionRecord};
use log::{error, info, warn};
use std::time::Instant;

/// Orchestrates version records over a version store and a resolver.
pub struct VersionManager<V: VersionRepository, R: ReferenceResolver> {
    versions: V,
    resolver: R,
    context: CoreContext,
}

impl<V: VersionRepository, R: ReferenceResolver> VersionManager<V, R> {
    pub fn new(versions: V, resolver: R, context: CoreContext) -> Self {
        Self {
            versions,
            resolver,
            context,
        }
    }

    /// Snapshots `entity` as its next version.
    ///
    /// `version_number = None` assigns `highest + 1` (or `1`); an explicit
    /// number must be positive and exceed every stored number.
    ///
    /// # Errors
    /// - `InvalidEntity` when the entity has no id or an unregistered type.
    /// - `NonMonotonicVersion` for an explicit number that is too low.
    /// - `DuplicateVersion` when a writer outside this process won the race.
    /// - `StoreUnavailable` / `Store` for store failures.
    pub fn create_version<T: Versionable>(
        &self,
        entity: &T,
        creator: UserId,
        version_number: Option<u32>,
        comment: Option<String>,
    ) -> VersionResult<VersionRecord> {
        let started_at = Instant::now();
        let entity_ref = entity.entity_ref();
        if entity_ref.entity_id.trim().is_empty() {
            return Err(VersionError::InvalidEntity(format!(
                "{} entity has no identifier",
                T::ENTITY_TYPE
            )));
        }
        if !self.context.schemas.contains(T::ENTITY_TYPE) {
            return Err(VersionError::InvalidEntity(format!(
                "entity type `{}` is not registered for versioning",
                T::ENTITY_TYPE
            )));
        }

        let fields = FieldCodec::new(&self.context.schemas).encode(entity)?;
        let result = self.context.locks.with_lock(&entity_ref, || -> VersionResult<_> {
            let highest = self.versions.highest_version_number(&entity_ref)?;
            let number = next_version_number(&entity_ref, highest, version_number)?;
            let new_version = NewVersion {
                entity_ref: entity_ref.clone(),
                version_number: number,
                fields,
                creator,
                comment,
                created_at: self.context.clock.now(),
            };
            self.versions
                .insert_version(&new_version)
                .map_err(|err| match err {
                    RepoError::Conflict(_) => VersionError::DuplicateVersion {
                        entity: entity_ref.clone(),
                        version_number: number,
                    },
                    other => other.into(),
                })
        });

        match &result {
            Ok(record) => info!(
                "event=version_create module=version status=ok entity={} version={} duration_ms={}",
                entity_ref,
                record.version_number(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=version_create module=version status=error entity={} duration_ms={} error={}",
                entity_ref,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Builds a transient `T` from `record`. Nothing is persisted.
    ///
    /// The decode is memoized on `record`, so repeated calls on the same
    /// instance resolve references only once.
    pub fn reconstruct<T: Versionable>(&self, record: &VersionRecord) -> VersionResult<T> {
        ensure_entity_type::<T>(record)?;
        let decoded = record.decoded_or_try_init(|| self.decode(record))?;
        let mut entity = T::blank(&record.entity_ref().entity_id)?;
        decoded.apply_to(&mut entity)?;
        Ok(entity)
    }

    /// Overwrites the live aggregate with `record`'s decoded fields.
    ///
    /// References are resolved afresh (the memo is not used) so values are
    /// checked against the store as it is now.
    ///
    /// # Errors
    /// - `EntityNotFound` when the live aggregate no longer exists.
    /// - Decode errors; the live aggregate is left untouched.
    pub fn revert<T, S>(&self, record: &VersionRecord, store: &S) -> VersionResult<()>
    where
        T: Versionable,
        S: AggregateStore<T>,
    {
        let started_at = Instant::now();
        ensure_entity_type::<T>(record)?;
        let entity_ref = record.entity_ref();

        let result = self.context.locks.with_lock(entity_ref, || -> VersionResult<usize> {
            let decoded = self.decode(record)?;
            let mut live = store
                .load(&entity_ref.entity_id)?
                .ok_or_else(|| VersionError::EntityNotFound(entity_ref.clone()))?;
            decoded.apply_to(&mut live)?;
            live.touch(self.context.clock.now());
            store.save(&live)?;
            Ok(decoded.len())
        });

        match &result {
            Ok(applied) => info!(
                "event=version_revert module=version status=ok entity={} version={} fields={} duration_ms={}",
                entity_ref,
                record.version_number(),
                applied,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=version_revert module=version status=error entity={} version={} duration_ms={} error={}",
                entity_ref,
                record.version_number(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result.map(|_| ())
    }

    /// All records of `entity`, oldest first.
    pub fn history(&self, entity: &EntityRef) -> VersionResult<Vec<VersionRecord>> {
        Ok(self.versions.list_versions(entity)?)
    }

    pub fn get_version(
        &self,
        entity: &EntityRef,
        version_number: u32,
    ) -> VersionResult<Option<VersionRecord>> {
        Ok(self.versions.get_version(entity, version_number)?)
    }

    pub fn latest_version(&self, entity: &EntityRef) -> VersionResult<Option<VersionRecord>> {
        match self.versions.highest_version_number(entity)? {
            Some(number) => self.get_version(entity, number),
            None => Ok(None),
        }
    }

    /// Version records are append-only; deleting one has no effect.
    pub fn delete_version(&self, record: &VersionRecord) -> VersionResult<()> {
        warn!(
            "event=version_delete module=version status=ignored entity={} version={}",
            record.entity_ref(),
            record.version_number()
        );
        Ok(())
    }

    fn decode(&self, record: &VersionRecord) -> VersionResult<DecodedFields> {
        FieldCodec::new(&self.context.schemas).decode(
            record.entity_type(),
            record.fields(),
            &self.resolver,
        )
    }
}

fn ensure_entity_type<T: Versionable>(record: &VersionRecord) -> VersionResult<()> {
    if record.entity_type() != T::ENTITY_TYPE {
        return Err(VersionError::TypeMismatch {
            expected: T::ENTITY_TYPE,
            found: record.entity_type().to_string(),
        });
    }
    Ok(())
}

fn next_version_number(
    entity: &EntityRef,
    highest: Option<u32>,
    requested: Option<u32>,
) -> VersionResult<u32> {
    let highest = highest.unwrap_or(0);
    match requested {
        None => highest.checked_add(1).ok_or_else(|| VersionError::NonMonotonicVersion {
            entity: entity.clone(),
            requested: highest,
            highest,
        }),
        Some(number) if number > highest => Ok(number),
        Some(number) => Err(VersionError::NonMonotonicVersion {
            entity: entity.clone(),
            requested: number,
            highest,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::next_version_number;
    use crate::model::entity::EntityRef;
    use crate::version::error::VersionError;

    #[test]
    fn next_number_starts_at_one_and_follows_highest() {
        let entity = EntityRef::new("note", "n");
        assert_eq!(next_version_number(&entity, None, None).unwrap(), 1);
        assert_eq!(next_version_number(&entity, Some(4), None).unwrap(), 5);
    }

    #[test]
    fn explicit_number_must_exceed_history() {
        let entity = EntityRef::new("note", "n");
        assert_eq!(next_version_number(&entity, Some(4), Some(10)).unwrap(), 10);
        assert!(matches!(
            next_version_number(&entity, Some(4), Some(4)),
            Err(VersionError::NonMonotonicVersion {
                requested: 4,
                highest: 4,
                ..
            })
        ));
        assert!(matches!(
            next_version_number(&entity, None, Some(0)),
            Err(VersionError::NonMonotonicVersion { requested: 0, .. })
        ));
    }
}
