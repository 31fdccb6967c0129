//! Integer handles for engine objects exposed across the boundary.
//!
//! Handle `0` is never issued so callers can use it as "no object".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A table mapping issued handles to values.
///
/// The lock is held only for the duration of each method; values that must be
/// used while calling out to foreign code should be cloned out first.
#[derive(Debug)]
pub struct HandleTable<T> {
    entries: Mutex<HashMap<u64, T>>,
    next: AtomicU64,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
        }
    }
}

impl<T> HandleTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` and returns its fresh handle.
    pub fn insert(&self, value: T) -> u64 {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(handle, value);
        handle
    }

    /// Removes and returns the value behind `handle`.
    pub fn remove(&self, handle: u64) -> Option<T> {
        self.lock().remove(&handle)
    }

    /// Runs `f` on the value behind `handle` while the table is locked.
    pub fn with<R>(&self, handle: u64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.lock().get_mut(&handle).map(f)
    }

    /// Returns `true` when `handle` is currently issued.
    #[must_use]
    pub fn contains(&self, handle: u64) -> bool {
        self.lock().contains_key(&handle)
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no handle is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> HandleTable<T> {
    /// Returns a clone of the value behind `handle`.
    #[must_use]
    pub fn get(&self, handle: u64) -> Option<T> {
        self.lock().get(&handle).cloned()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn handles_start_at_one_and_are_never_reused() {
        let table = HandleTable::new();
        let first = table.insert("a");
        let second = table.insert("b");
        assert_eq!(first, 1);
        assert_ne!(first, second);

        assert_eq!(table.remove(first), Some("a"));
        let third = table.insert("c");
        assert!(third > second);
        assert!(!table.contains(first));
    }

    #[rstest]
    fn with_mutates_in_place() {
        let table = HandleTable::new();
        let handle = table.insert(vec![1]);
        assert_eq!(table.with(handle, |values| {
            values.push(2);
            values.len()
        }), Some(2));
        assert_eq!(table.get(handle), Some(vec![1, 2]));
        assert_eq!(table.with(99, |values| values.len()), None);
    }
}
