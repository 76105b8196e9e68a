use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{PgzError, Result};

/// Concurrent staging area that hands entries out strictly by sequence index.
///
/// Entries may be inserted in any order, but extraction only ever returns the
/// entry at the pop cursor, which starts at zero and advances by one for every
/// successful [`try_take_next`](Self::try_take_next). Readers (`len`,
/// `peek_is_next`) share the lock; inserts and extraction are exclusive.
#[derive(Debug)]
pub struct StagingMap<V> {
    inner: RwLock<StagingState<V>>,
}

#[derive(Debug)]
struct StagingState<V> {
    next_index: usize,
    entries: HashMap<usize, V>,
}

impl<V> Default for StagingMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> StagingMap<V> {
    /// Creates an empty staging map with the cursor at index zero.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty staging map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StagingState {
                next_index: 0,
                entries: HashMap::with_capacity(capacity),
            }),
        }
    }

    /// Stores `value` under `index`.
    ///
    /// # Errors
    /// Returns [`PgzError::DuplicateIndex`] if the index is already staged or
    /// has already been extracted.
    pub fn insert(&self, index: usize, value: V) -> Result<()> {
        let mut state = self.write();
        if index < state.next_index || state.entries.contains_key(&index) {
            return Err(PgzError::DuplicateIndex {
                index,
                next_expected: state.next_index,
            });
        }

        state.entries.insert(index, value);
        Ok(())
    }

    /// Number of inserted entries that have not been extracted yet.
    ///
    /// The value is advisory: it may be stale as soon as it is returned.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the index the next extraction will yield.
    pub fn next_index(&self) -> usize {
        self.read().next_index
    }

    /// Returns true iff `index` is the cursor and its entry is present.
    pub fn peek_is_next(&self, index: usize) -> bool {
        let state = self.read();
        index == state.next_index && state.entries.contains_key(&index)
    }

    /// Removes and returns the entry at the cursor, advancing the cursor.
    ///
    /// Returns `None` and leaves the cursor untouched when that entry has not
    /// been inserted yet.
    pub fn try_take_next(&self) -> Option<(usize, V)> {
        let mut state = self.write();
        let index = state.next_index;
        let value = state.entries.remove(&index)?;
        state.next_index += 1;
        Some((index, value))
    }

    // A panicking caller cannot leave the state half-updated, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, StagingState<V>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StagingState<V>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
