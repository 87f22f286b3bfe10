//! Slot-keyed memoization for per-object derived state.
//!
//! Every object instance derives several views from its remote
//! representation (raw entry, attribute map, allowable actions, parent
//! folders, relationship collections). Each view lives in its own
//! [`CacheSlot`]: computed at most once, then served from memory until the
//! slot is explicitly invalidated. Staleness after a mutation is a
//! correctness bug, so save and reload invalidate every possibly-stale slot
//! before the next read.
//!
//! Slots use `RefCell` interior mutability: object instances are not meant
//! to be shared across threads, and callers serialize access to a single
//! instance.

use std::cell::RefCell;

use tracing::trace;

/// A single memoized value with explicit invalidation.
#[derive(Debug, Clone)]
pub struct CacheSlot<T> {
    name: &'static str,
    value: RefCell<Option<T>>,
}

impl<T: Clone> CacheSlot<T> {
    /// Create an empty slot. The name only shows up in trace output.
    pub fn new(name: &'static str) -> Self {
        Self { name, value: RefCell::new(None) }
    }

    /// Return the cached value, computing and storing it first if the slot
    /// is empty. A failed computation leaves the slot empty.
    pub fn get_or_try_init<E>(
        &self,
        compute: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        if let Some(value) = self.value.borrow().as_ref() {
            return Ok(value.clone());
        }
        let value = compute()?;
        trace!(slot = self.name, "cache slot populated");
        *self.value.borrow_mut() = Some(value.clone());
        Ok(value)
    }

    /// Store a value directly, replacing whatever was cached.
    pub fn prime(&self, value: T) {
        *self.value.borrow_mut() = Some(value);
    }

    /// Discard the cached value; the next read recomputes.
    pub fn invalidate(&self) {
        if self.value.borrow_mut().take().is_some() {
            trace!(slot = self.name, "cache slot invalidated");
        }
    }

    /// Whether a value is currently cached.
    pub fn is_cached(&self) -> bool {
        self.value.borrow().is_some()
    }
}
