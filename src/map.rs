//! The bucket layer on top of the global sorted list.
//!
//! Buckets are plain pointers into the list: each slot of the bucket array
//! refers to the sentinel node behind which the bucket's regular entries are
//! linked. Slots start out null and are initialized on first use by inserting
//! a sentinel behind the (recursively initialized) parent bucket's sentinel.
//!
//! Growing the table never rehashes: a doubled bucket array is published with
//! a single CAS, the old array is retired through the epoch scheme and the
//! new upper-half buckets materialize lazily like any other uninitialized
//! bucket.

cfg_if::cfg_if! {
    if #[cfg(not(feature = "std"))] {
        use alloc::boxed::Box;
        use alloc::vec::Vec;
    }
}

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use arrayvec::ArrayVec;

use crate::config::Config;
use crate::guard::Guard;
use crate::hash;
use crate::list::{self, InsertResult, Node};

/// The key reserved for bucket sentinels.
pub(crate) const RESERVED_KEY: u64 = 0;

/// The maximum length of a bucket parent chain (one per bit of the index).
const MAX_BUCKET_DEPTH: usize = 64;

////////////////////////////////////////////////////////////////////////////////////////////////////
// BucketArray
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A fixed array of bucket slots, each either null (uninitialized) or a
/// pointer to the bucket's sentinel node.
///
/// The slice is wrapped in a heap struct so that a retired array can be
/// recorded through a thin pointer and so that the capacity is published
/// together with the slots.
pub(crate) struct BucketArray<V> {
    slots: Box<[AtomicPtr<Node<V>>]>,
}

/********** impl inherent *************************************************************************/

impl<V> BucketArray<V> {
    /// Allocates a new array of `capacity` uninitialized slots.
    #[inline]
    fn with_capacity(capacity: usize) -> Box<Self> {
        let slots: Vec<_> = (0..capacity).map(|_| AtomicPtr::new(ptr::null_mut())).collect();
        Box::new(Self { slots: slots.into_boxed_slice() })
    }

    /// Returns the number of buckets.
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the slot for `bucket`.
    #[inline]
    fn slot(&self, bucket: usize) -> &AtomicPtr<Node<V>> {
        &self.slots[bucket]
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawMap
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The map core: the head sentinel rooting the global list, the current
/// bucket array and the entry count gating table growth.
pub(crate) struct RawMap<V> {
    head: NonNull<Node<V>>,
    buckets: AtomicPtr<BucketArray<V>>,
    count: AtomicUsize,
    load_factor: usize,
}

/********** impl inherent *************************************************************************/

impl<V> RawMap<V> {
    /// Creates a new `RawMap` with the configured initial capacity.
    #[inline]
    pub fn with_config(config: Config) -> Self {
        let head = NonNull::from(Box::leak(Node::dummy(0)));
        let buckets = BucketArray::with_capacity(config.initial_capacity());
        buckets.slot(0).store(head.as_ptr(), Ordering::Relaxed);

        Self {
            head,
            buckets: AtomicPtr::new(Box::into_raw(buckets)),
            count: AtomicUsize::new(0),
            load_factor: config.load_factor() as usize,
        }
    }

    /// Returns the approximate number of regular entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the current number of buckets.
    ///
    /// The exclusive receiver rules out a concurrent table growth, so the
    /// array can be read without entering a critical section.
    #[inline]
    pub fn capacity(&mut self) -> usize {
        unsafe { (*self.buckets.load(Ordering::Relaxed)).capacity() }
    }

    /// Maps `key` to `value` and returns the previously mapped value, if any.
    ///
    /// The reserved key is rejected by returning `None` without any effect.
    ///
    /// # Safety
    ///
    /// `guard` must represent an active critical section of the collector
    /// guarding this map.
    pub unsafe fn insert(
        &self,
        key: u64,
        value: NonNull<V>,
        guard: &Guard<'_, '_>,
    ) -> Option<NonNull<V>> {
        if key == RESERVED_KEY {
            return None;
        }

        let array = &*self.buckets.load(Ordering::Acquire);
        let bucket = hash::bucket_of(key, array.capacity());
        let dummy = self.bucket_dummy(array, bucket, guard);

        let node = Node::ordinary(key, value);
        match list::insert(&dummy.as_ref().next, node, guard) {
            InsertResult::Updated { prior } => NonNull::new(prior),
            InsertResult::Inserted(_) => {
                self.count.fetch_add(1, Ordering::Relaxed);
                self.try_grow(guard);
                None
            }
            InsertResult::Existing(_) => unreachable!("regular keys never collide with sentinels"),
        }
    }

    /// Returns the value currently mapped to `key`, if any.
    ///
    /// # Safety
    ///
    /// Same contract as [`insert`][RawMap::insert].
    pub unsafe fn get(&self, key: u64, guard: &Guard<'_, '_>) -> Option<NonNull<V>> {
        if key == RESERVED_KEY {
            return None;
        }

        let array = &*self.buckets.load(Ordering::Acquire);
        let bucket = hash::bucket_of(key, array.capacity());
        let dummy = self.bucket_dummy(array, bucket, guard);

        match list::find(&dummy.as_ref().next, hash::ordinary_key(key), key, guard) {
            list::FindResult::Found { curr, .. } => {
                NonNull::new(curr.as_ref().value.load(Ordering::Acquire))
            }
            list::FindResult::Absent { .. } => None,
        }
    }

    /// Removes the mapping for `key` and returns the removed value, if any.
    ///
    /// # Safety
    ///
    /// Same contract as [`insert`][RawMap::insert].
    pub unsafe fn remove(&self, key: u64, guard: &Guard<'_, '_>) -> Option<NonNull<V>> {
        if key == RESERVED_KEY {
            return None;
        }

        let array = &*self.buckets.load(Ordering::Acquire);
        let bucket = hash::bucket_of(key, array.capacity());
        let dummy = self.bucket_dummy(array, bucket, guard);

        let removed = list::remove(&dummy.as_ref().next, hash::ordinary_key(key), key, guard);
        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }

        removed
    }

    /// Returns `bucket`'s sentinel node, initializing the bucket and any
    /// uninitialized ancestors first if necessary.
    unsafe fn bucket_dummy(
        &self,
        array: &BucketArray<V>,
        bucket: usize,
        guard: &Guard<'_, '_>,
    ) -> NonNull<Node<V>> {
        let existing = array.slot(bucket).load(Ordering::Acquire);
        match NonNull::new(existing) {
            Some(dummy) => dummy,
            None => self.initialize_bucket(array, bucket, guard),
        }
    }

    /// Walks the parent chain of `bucket` up to the first initialized
    /// ancestor, then initializes the chain back down.
    ///
    /// Racing initializations of the same bucket are benign: the sentinel
    /// insertion returns the already linked node and the slot CAS simply
    /// fails with the same value already installed.
    #[cold]
    unsafe fn initialize_bucket(
        &self,
        array: &BucketArray<V>,
        bucket: usize,
        guard: &Guard<'_, '_>,
    ) -> NonNull<Node<V>> {
        let mut chain = ArrayVec::<[usize; MAX_BUCKET_DEPTH]>::new();

        let mut ancestor = bucket;
        while ancestor != 0 && array.slot(ancestor).load(Ordering::Acquire).is_null() {
            chain.push(ancestor);
            ancestor = hash::parent_bucket(ancestor);
        }

        // bucket 0 holds the head sentinel from construction, every other
        // chain ends at an initialized slot
        let mut parent = NonNull::new_unchecked(array.slot(ancestor).load(Ordering::Acquire));

        for &index in chain.iter().rev() {
            let sentinel = match list::insert(&parent.as_ref().next, Node::dummy(index as u64), guard)
            {
                InsertResult::Inserted(node) | InsertResult::Existing(node) => node,
                InsertResult::Updated { .. } => {
                    unreachable!("sentinels never collide with regular keys")
                }
            };

            // losing the race installs the identical sentinel
            let _ = array.slot(index).compare_exchange(
                ptr::null_mut(),
                sentinel.as_ptr(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            );

            parent = sentinel;
        }

        parent
    }

    /// Doubles the bucket array if the configured load factor is exceeded.
    ///
    /// The old array is retired through the epoch scheme; losing the publish
    /// race discards the allocation again.
    unsafe fn try_grow(&self, guard: &Guard<'_, '_>) {
        let current = self.buckets.load(Ordering::Acquire);
        let capacity = (*current).capacity();
        if self.count.load(Ordering::Relaxed) * 100 < capacity * self.load_factor {
            return;
        }

        let grown = BucketArray::with_capacity(2 * capacity);
        for bucket in 0..capacity {
            let sentinel = (*current).slot(bucket).load(Ordering::Acquire);
            grown.slot(bucket).store(sentinel, Ordering::Relaxed);
        }

        let grown = Box::into_raw(grown);
        match self.buckets.compare_exchange(current, grown, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => guard.retire(NonNull::new_unchecked(current)),
            Err(_) => {
                let _ = Box::from_raw(grown);
            }
        }
    }
}

/********** impl Drop *****************************************************************************/

impl<V> Drop for RawMap<V> {
    #[inline(never)]
    fn drop(&mut self) {
        // the exclusive receiver guarantees that no thread is still inside a
        // critical section, so the whole list can be freed in one walk
        let mut curr = self.head.as_ptr();
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next.load(Ordering::Relaxed).as_ptr();
        }

        let _ = unsafe { Box::from_raw(self.buckets.load(Ordering::Relaxed)) };
    }
}
