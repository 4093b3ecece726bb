//! Per-entity mutual exclusion.
//!
//! # Responsibility
//! - Serialize read-then-write sequences (version numbering, tag
//!   check-then-attach, revert) for one `EntityRef` across threads.
//!
//! # Invariants
//! - At most one closure runs under the lock of a given `EntityRef` at a
//!   time; different entities never block each other.
//! - Slots are dropped once no thread holds or waits on them.
//! - Locks are not re-entrant: a closure must not take the lock of the same
//!   entity again.

use crate::model::entity::EntityRef;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct EntityLocks {
    slots: Mutex<HashMap<EntityRef, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `critical` while holding the lock for `entity`.
    pub fn with_lock<T>(&self, entity: &EntityRef, critical: impl FnOnce() -> T) -> T {
        let slot = self.acquire_slot(entity);
        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            critical()
        };
        self.release_slot(entity, slot);
        result
    }

    /// Number of entities with a live slot.
    pub fn active_slots(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn acquire_slot(&self, entity: &EntityRef) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(entity.clone()).or_default())
    }

    fn release_slot(&self, entity: &EntityRef, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // map + this handle
        if Arc::strong_count(&slot) == 2 {
            slots.remove(entity);
        }
    }
}
