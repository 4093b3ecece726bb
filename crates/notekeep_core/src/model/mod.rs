//! Domain model for notes, tags, users and entity references.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Provide the polymorphic `EntityRef` used by version history.
//!
//! # Invariants
//! - Notes are identified by a stable UUID; tags and users by integer ids.
//! - Deletion of notes is represented by soft-delete state, not hard delete.

pub mod entity;
pub mod note;
pub mod user;
