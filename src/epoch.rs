//! The globally shared state of the epoch-based reclamation scheme.
//!
//! # Epochs
//!
//! A single global counter partitions time into coarse quanta. Every thread
//! that wants to traverse shared records announces the epoch it has observed
//! before entering its critical section and announces the quiescent sentinel
//! when it leaves. The counter may only advance once every announced epoch has
//! caught up with it, which yields the central guarantee: when the counter
//! reads `E + 2`, no thread can still hold a reference to a record that was
//! unlinked while the counter read `E`. Records are therefore sorted into
//! three bags by epoch residue and each bag is emptied exactly two advances
//! after it was filled.
//!
//! # Thread Slots
//!
//! The announcements live in a fixed table of thread slots. A slot is
//! claimed by [`register`](Collector::register) with a single CAS on its
//! `active` flag and released when the returned [`Local`] is dropped, so the
//! table never grows and can be scanned without synchronization beyond the
//! per-slot atomics. The table size can be overridden at build time through
//! the `SPLITMAP_MAX_THREADS` environment variable.

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::local::Local;
use crate::retired::{AbandonedEntry, AbandonedQueue};

include!(concat!(env!("OUT_DIR"), "/build_constants.rs"));

/// The epoch value announced by threads outside any critical section.
///
/// It compares greater than every reachable epoch and hence never delays an
/// advance.
pub(crate) const QUIESCENT: u64 = u64::MAX;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Collector
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The shared state of one reclamation domain: the global epoch, the thread
/// slot table and the queue of abandoned retire bags.
///
/// Every map owns its own `Collector`; threads interact with it exclusively
/// through a registered [`Local`].
#[derive(Debug)]
pub struct Collector {
    epoch: AtomicU64,
    slots: [ThreadSlot; MAX_THREADS],
    abandoned: AbandonedQueue,
}

/********** impl inherent *************************************************************************/

impl Collector {
    /// The maximum number of concurrently registered threads.
    pub const MAX_THREADS: usize = MAX_THREADS;

    /// Creates a new `Collector` with the epoch counter at zero and all slots
    /// vacant.
    #[inline]
    pub const fn new() -> Self {
        const VACANT: ThreadSlot = ThreadSlot::new();
        Self {
            epoch: AtomicU64::new(0),
            slots: [VACANT; MAX_THREADS],
            abandoned: AbandonedQueue::new(),
        }
    }

    /// Claims a vacant thread slot and returns the [`Local`] state owning it.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryFull`] if all [`MAX_THREADS`](Self::MAX_THREADS)
    /// slots are currently claimed.
    #[inline]
    pub fn register(&self) -> Result<Local<'_>, RegistryFull> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.active.load(Ordering::Relaxed) {
                continue;
            }

            let claim =
                slot.active.compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed);
            if claim.is_ok() {
                slot.epoch.store(QUIESCENT, Ordering::Release);
                return Ok(Local::new(self, index));
            }
        }

        Err(RegistryFull)
    }

    /// Returns the current global epoch.
    #[inline]
    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Returns the slot at `index`.
    #[inline]
    pub(crate) fn slot(&self, index: usize) -> &ThreadSlot {
        &self.slots[index]
    }

    /// Attempts to advance the global epoch by one and returns the new epoch
    /// on success.
    ///
    /// The advance is refused while any registered thread has announced an
    /// epoch behind the current one.
    #[inline]
    pub(crate) fn try_advance(&self) -> Option<u64> {
        let global = self.epoch.load(Ordering::SeqCst);
        for slot in self.slots.iter() {
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }

            let announced = slot.epoch.load(Ordering::Acquire);
            if announced != QUIESCENT && announced < global {
                return None;
            }
        }

        self.epoch
            .compare_exchange(global, global + 1, Ordering::AcqRel, Ordering::Relaxed)
            .ok()
            .map(|previous| previous + 1)
    }

    /// Stores an exiting thread's (non-empty) arrears for later adoption.
    #[inline]
    pub(crate) fn abandon(&self, entry: Box<AbandonedEntry>) {
        self.abandoned.push(entry);
    }

    /// Takes and merges all abandoned arrears, if there are any.
    #[inline]
    pub(crate) fn try_adopt(&self) -> Option<Box<AbandonedEntry>> {
        self.abandoned.take_all_and_merge()
    }
}

/********** impl Default **************************************************************************/

impl Default for Collector {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ThreadSlot
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One entry of the registration table.
#[derive(Debug)]
pub(crate) struct ThreadSlot {
    /// Set while the slot is claimed by a registered thread.
    pub active: AtomicBool,
    /// The epoch announced by the owning thread, [`QUIESCENT`] outside of
    /// critical sections.
    pub epoch: AtomicU64,
}

/********** impl inherent *************************************************************************/

impl ThreadSlot {
    #[inline]
    const fn new() -> Self {
        Self { active: AtomicBool::new(false), epoch: AtomicU64::new(QUIESCENT) }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RegistryFull
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Error type returned when the thread slot table is saturated.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct RegistryFull;

/********** impl Display **************************************************************************/

impl fmt::Display for RegistryFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} thread slots are registered", MAX_THREADS)
    }
}
