//! Shared runtime collaborators handed to services.

use crate::clock::{Clock, SystemClock};
use crate::locks::EntityLocks;
use crate::version::field::SchemaRegistry;
use std::sync::Arc;

/// Clock, entity locks and schema registry shared by every service.
///
/// Cloning is cheap; clones share the same lock table, so services on
/// different threads (each with its own connection) still serialize work on
/// the same entity.
#[derive(Clone)]
pub struct CoreContext {
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<EntityLocks>,
    pub schemas: Arc<SchemaRegistry>,
}

impl CoreContext {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            locks: Arc::new(EntityLocks::new()),
            schemas: Arc::new(SchemaRegistry::with_defaults()),
        }
    }

    /// Replaces the schema registry, e.g. to register extra aggregates.
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = Arc::new(schemas);
        self
    }
}

impl Default for CoreContext {
    fn default() -> Self {
        Self::new()
    }
}
