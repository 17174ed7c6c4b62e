//! A lock-free hash map from 64-bit keys to opaque value pointers, built on a
//! split-ordered list and protected by epoch-based memory reclamation.
//!
//! All entries live in one linked list sorted by the bit-reversal of their
//! mixed hash, so the table can double its bucket count without ever moving
//! an entry. Readers and writers never block each other; unlinked nodes are
//! handed to the per-map epoch [`Collector`] and freed once no thread can
//! still reach them.
//!
//! Threads interact with a map through a registered [`LocalRef`]:
//!
//! ```
//! use core::ptr::NonNull;
//! use splitmap::SplitOrderedMap;
//!
//! let value = 42;
//! let map: SplitOrderedMap<i32> = SplitOrderedMap::new();
//!
//! let local = map.register().unwrap();
//! assert_eq!(local.insert(1, NonNull::from(&value)), None);
//! assert_eq!(local.get(1), Some(NonNull::from(&value)));
//! assert_eq!(local.remove(1), Some(NonNull::from(&value)));
//! ```
//!
//! Key `0` is reserved for the internal bucket sentinels; operations on it
//! return `None` without any effect. The map never reads or frees the memory
//! behind the stored pointers, their lifetime remains the caller's
//! responsibility.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

mod config;
mod epoch;
mod guard;
mod hash;
mod list;
mod local;
mod map;
mod queue;
mod retired;

pub use crate::config::{Config, ConfigBuilder};
pub use crate::epoch::{Collector, RegistryFull};
pub use crate::guard::Guard;
pub use crate::local::Local;

use core::fmt;
use core::ptr::NonNull;

use crate::map::RawMap;

////////////////////////////////////////////////////////////////////////////////////////////////////
// SplitOrderedMap
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free map from `u64` keys to `NonNull<V>` value pointers.
///
/// The map owns its nodes and its [`Collector`], but never the memory behind
/// the stored value pointers. Dropping the map frees every remaining node and
/// all records still awaiting reclamation; the borrow on the map held by each
/// [`LocalRef`] guarantees that no thread can still be inside an operation at
/// that point.
pub struct SplitOrderedMap<V> {
    raw: RawMap<V>,
    collector: Collector,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<V: Send> Send for SplitOrderedMap<V> {}
unsafe impl<V: Send + Sync> Sync for SplitOrderedMap<V> {}

/********** impl inherent *************************************************************************/

impl<V> SplitOrderedMap<V> {
    /// Creates a new map with the default [`Config`].
    #[inline]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new map with the given `config`.
    #[inline]
    pub fn with_config(config: Config) -> Self {
        Self { raw: RawMap::with_config(config), collector: Collector::new() }
    }

    /// Registers the calling thread and returns its operation handle.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryFull`] if
    /// [`MAX_THREADS`](Collector::MAX_THREADS) handles are currently
    /// registered.
    #[inline]
    pub fn register(&self) -> Result<LocalRef<'_, V>, RegistryFull> {
        Ok(LocalRef { map: self, local: self.collector.register()? })
    }

    /// Returns the approximate number of entries.
    ///
    /// Under concurrent mutation the value is a best-effort snapshot.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map contains (approximately) no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current number of buckets.
    ///
    /// Requires exclusive access, since the bucket array may otherwise be
    /// replaced concurrently.
    #[inline]
    pub fn capacity(&mut self) -> usize {
        self.raw.capacity()
    }
}

/********** impl Default **************************************************************************/

impl<V> Default for SplitOrderedMap<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<V> fmt::Debug for SplitOrderedMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitOrderedMap").field("len", &self.len()).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// LocalRef
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A per-thread handle to a [`SplitOrderedMap`].
///
/// The handle combines a borrow of the map with the thread's registered
/// [`Local`] state; every operation enters a critical section for its
/// duration. Dropping the handle unregisters the thread from the map's
/// [`Collector`].
#[derive(Debug)]
pub struct LocalRef<'m, V> {
    map: &'m SplitOrderedMap<V>,
    local: Local<'m>,
}

/********** impl inherent *************************************************************************/

impl<'m, V> LocalRef<'m, V> {
    /// Maps `key` to `value` and returns the previously mapped value, if any.
    ///
    /// The reserved key `0` is rejected by returning `None` without any
    /// effect.
    #[inline]
    pub fn insert(&self, key: u64, value: NonNull<V>) -> Option<NonNull<V>> {
        let guard = self.local.pin();
        unsafe { self.map.raw.insert(key, value, &guard) }
    }

    /// Returns the value currently mapped to `key`, if any.
    #[inline]
    pub fn get(&self, key: u64) -> Option<NonNull<V>> {
        let guard = self.local.pin();
        unsafe { self.map.raw.get(key, &guard) }
    }

    /// Removes the mapping for `key` and returns the removed value, if any.
    #[inline]
    pub fn remove(&self, key: u64) -> Option<NonNull<V>> {
        let guard = self.local.pin();
        unsafe { self.map.raw.remove(key, &guard) }
    }

    /// Returns the approximate number of entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the map contains (approximately) no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Enters an explicit critical section spanning multiple operations.
    #[inline]
    pub fn pin(&self) -> Guard<'_, 'm> {
        self.local.pin()
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;

    use crate::{Collector, ConfigBuilder, SplitOrderedMap};

    #[test]
    fn operations_via_the_handle() {
        let map: SplitOrderedMap<u64> = SplitOrderedMap::new();
        let local = map.register().unwrap();

        let (v1, v2) = (1u64, 2u64);

        assert_eq!(local.insert(17, NonNull::from(&v1)), None);
        assert_eq!(local.insert(17, NonNull::from(&v2)), Some(NonNull::from(&v1)));
        assert_eq!(local.get(17), Some(NonNull::from(&v2)));
        assert_eq!(local.len(), 1);

        assert_eq!(local.remove(17), Some(NonNull::from(&v2)));
        assert!(local.is_empty());
    }

    #[test]
    fn handles_are_limited_per_map() {
        let map: SplitOrderedMap<u64> = SplitOrderedMap::new();

        let handles: Vec<_> = (0..Collector::MAX_THREADS).map(|_| map.register().unwrap()).collect();
        assert!(map.register().is_err());

        drop(handles);
        assert!(map.register().is_ok());
    }

    #[test]
    fn configured_capacity_is_respected() {
        let config = ConfigBuilder::new().initial_capacity(64).build();
        let mut map: SplitOrderedMap<u64> = SplitOrderedMap::with_config(config);
        assert_eq!(map.capacity(), 64);
    }

    #[test]
    fn a_thread_can_use_one_map_after_another() {
        let value = 5u64;

        let first: SplitOrderedMap<u64> = SplitOrderedMap::new();
        {
            let local = first.register().unwrap();
            local.insert(1, NonNull::from(&value));
        }

        let second: SplitOrderedMap<u64> = SplitOrderedMap::new();
        let local = second.register().unwrap();
        assert_eq!(local.get(1), None);
        local.insert(1, NonNull::from(&value));
        assert_eq!(local.get(1), Some(NonNull::from(&value)));

        let local = first.register().unwrap();
        assert_eq!(local.get(1), Some(NonNull::from(&value)));
    }
}
