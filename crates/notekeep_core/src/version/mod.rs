//! Generic versioning subsystem.
//!
//! # Responsibility
//! - Snapshot any registered aggregate into immutable version records.
//! - Reconstruct transient views from records and revert live aggregates.
//!
//! # Invariants
//! - Per-type field tables come from an explicit `SchemaRegistry`; nothing
//!   is discovered at runtime.
//! - Version records are append-only.
//!
//! Data flow: mutation -> `VersionManager::create_version` ->
//! `FieldCodec::encode` -> `VersionRepository::insert_version`; and back via
//! `VersionManager::revert` -> `FieldCodec::decode` -> `AggregateStore::save`.

pub mod codec;
pub mod error;
pub mod field;
pub mod manager;
pub mod record;
