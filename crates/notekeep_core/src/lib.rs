//! Core domain logic for notekeep: notes, shared tags and a generic
//! versioning subsystem over SQLite.
//! This crate is the single source of truth for business invariants.

pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod locks;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod version;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use context::CoreContext;
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{EntityRef, Lifecycle, SoftDeleteState};
pub use model::note::{Note, NoteId, NoteValidationError, Tag, TagId, TagValidationError};
pub use model::user::{User, UserId, UserValidationError};
pub use repo::note_repo::{NoteListQuery, NoteRepository, SqliteNoteRepository};
pub use repo::reference::{ReferenceResolver, SqliteReferenceResolver};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};
pub use repo::version_repo::{SqliteVersionRepository, VersionRepository};
pub use repo::{AggregateStore, RepoError, RepoResult};
pub use service::note_service::{
    AuthorOverview, NoteDraft, NoteService, NoteServiceError, NoteUpdate,
};
pub use version::codec::{DecodedFields, EncodedFields, FieldCodec};
pub use version::error::{VersionError, VersionResult};
pub use version::field::{FieldKind, FieldValue, SchemaRegistry, TypeSchema, Versionable};
pub use version::manager::VersionManager;
pub use version::record::VersionRecord;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
