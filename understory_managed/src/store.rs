// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object sparse local value storage.
//!
//! # Implementation
//!
//! A sorted vector with binary search rather than a hash map: contiguous
//! memory, no hash buckets, and O(log n) lookup which is fast for the handful
//! of properties a typical object sets locally. The first few entries are
//! stored inline via `SmallVec`.

use smallvec::SmallVec;

use crate::id::PropertyId;
use crate::value::ErasedValue;

/// Most objects set fewer than 8 properties locally.
const INLINE_CAPACITY: usize = 8;

/// Local values of one object, sorted by [`PropertyId`].
#[derive(Clone, Debug, Default)]
pub(crate) struct LocalStore {
    entries: SmallVec<[(PropertyId, ErasedValue); INLINE_CAPACITY]>,
}

impl LocalStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn find(&self, id: PropertyId) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&id, |(pid, _)| *pid)
    }

    /// Gets the local value, if set.
    #[inline]
    pub(crate) fn get(&self, id: PropertyId) -> Option<&ErasedValue> {
        self.find(id).ok().map(|idx| &self.entries[idx].1)
    }

    pub(crate) fn contains(&self, id: PropertyId) -> bool {
        self.find(id).is_ok()
    }

    /// Sets the local value, replacing any previous one.
    pub(crate) fn set(&mut self, id: PropertyId, value: ErasedValue) {
        match self.find(id) {
            Ok(idx) => self.entries[idx].1 = value,
            Err(idx) => self.entries.insert(idx, (id, value)),
        }
    }

    /// Clears the local value.
    ///
    /// Returns `true` if a value was removed.
    pub(crate) fn clear(&mut self, id: PropertyId) -> bool {
        if let Ok(idx) = self.find(id) {
            self.entries.remove(idx);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }
}
