//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Take the entity locks and clock from a shared `CoreContext`.

pub mod note_service;
