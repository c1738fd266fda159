//! Lock-free stack of free slot indices
//!
//! Fixed-capacity pools (waiter nodes, handle slots) hand out `u32` indices
//! instead of pointers. Free indices are kept on a Treiber stack whose head
//! packs a 32-bit tag next to the index, so a pop that raced with a
//! pop/push pair of the same index fails its CAS instead of corrupting the
//! list.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Terminator for index-linked lists.
pub(crate) const END: u32 = u32::MAX;

/// Largest capacity an index pool may be built with. The two topmost index
/// values are reserved as list markers.
pub(crate) const MAX_CAPACITY: u32 = u32::MAX - 2;

#[inline]
fn pack(
    tag: u32,
    index: u32,
) -> u64 {
    ((tag as u64) << 32) | index as u64
}

#[inline]
fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// A lock-free free list over the indices `0..capacity`.
#[derive(Debug)]
pub(crate) struct IndexStack {
    head: AtomicU64,
    next: Box<[AtomicU32]>,
    available: AtomicUsize,
}

impl IndexStack {
    /// Create a stack holding every index of the pool, lowest on top.
    pub(crate) fn full(capacity: u32) -> Self {
        assert!(capacity <= MAX_CAPACITY, "index pool capacity too large");
        let next = (0..capacity)
            .map(|i| AtomicU32::new(if i + 1 < capacity { i + 1 } else { END }))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let first = if capacity == 0 { END } else { 0 };

        Self {
            head: AtomicU64::new(pack(0, first)),
            next,
            available: AtomicUsize::new(capacity as usize),
        }
    }

    /// Total number of indices managed by the stack.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.next.len()
    }

    /// Number of indices currently free. Only a hint under concurrency.
    #[inline]
    pub(crate) fn available(&self) -> usize {
        self.available.load(Ordering::Relaxed)
    }

    /// Take a free index, or `None` when the pool is exhausted.
    pub(crate) fn pop(&self) -> Option<u32> {
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let (tag, index) = unpack(current);
            if index == END {
                return None;
            }
            // May read a link that is being rewritten by a concurrent
            // pop/push of the same index; the tag makes the CAS fail then.
            let next = self.next[index as usize].load(Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                current,
                pack(tag.wrapping_add(1), next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.available.fetch_sub(1, Ordering::Relaxed);
                    return Some(index);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Return an index to the pool.
    pub(crate) fn push(
        &self,
        index: u32,
    ) {
        debug_assert!((index as usize) < self.next.len());
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack(current);
            self.next[index as usize].store(top, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                current,
                pack(tag.wrapping_add(1), index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.available.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }
}
