//! Waiter lists
//!
//! Every event keeps its waiters on a singly linked list of nodes taken from
//! a shared [`WaiterPool`]. The list head is an atomic node index with two
//! reserved values: `END` (empty list) and `SEALED` (the event fired; no
//! further node may be pushed). Registration pushes with a CAS loop,
//! satisfaction swaps the head to `SEALED` and walks the captured chain.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::runtime::arena::{IndexStack, END, MAX_CAPACITY};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::guid::Guid;

/// Head value of a list whose event has fired.
pub(crate) const SEALED: u32 = u32::MAX - 1;

/// A waiter and the slot it wants to be signaled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaiterRef {
    pub waiter: Guid,
    pub slot: u32,
}

impl WaiterRef {
    #[inline]
    pub fn new(
        waiter: Guid,
        slot: u32,
    ) -> Self {
        Self { waiter, slot }
    }
}

impl fmt::Display for WaiterRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}[{}]", self.waiter, self.slot)
    }
}

struct WaiterNode {
    waiter: AtomicU64,
    slot: AtomicU32,
    next: AtomicU32,
}

/// Preallocated pool of waiter nodes shared by all events.
pub struct WaiterPool {
    nodes: Box<[WaiterNode]>,
    free: IndexStack,
}

impl WaiterPool {
    pub fn with_capacity(capacity: u32) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let nodes = (0..capacity)
            .map(|_| WaiterNode {
                waiter: AtomicU64::new(0),
                slot: AtomicU32::new(0),
                next: AtomicU32::new(END),
            })
            .collect::<Vec<_>>();
        Self {
            nodes: nodes.into_boxed_slice(),
            free: IndexStack::full(capacity),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Nodes currently linked into some list.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.free.capacity() - self.free.available()
    }

    fn acquire(
        &self,
        waiter: WaiterRef,
    ) -> RuntimeResult<u32> {
        let index = self.free.pop().ok_or(RuntimeError::ResourceExhausted {
            resource: "waiter pool",
            capacity: self.capacity(),
        })?;
        let node = &self.nodes[index as usize];
        node.waiter.store(waiter.waiter.raw(), Ordering::Relaxed);
        node.slot.store(waiter.slot, Ordering::Relaxed);
        Ok(index)
    }

    #[inline]
    fn release(
        &self,
        index: u32,
    ) {
        self.free.push(index);
    }

    /// Walk a chain captured by [`WaiterList::seal`], releasing each node.
    ///
    /// Nodes that are not consumed are released when the iterator drops.
    pub(crate) fn drain(
        &self,
        head: u32,
    ) -> Drain<'_> {
        Drain { pool: self, cursor: head }
    }
}

impl fmt::Debug for WaiterPool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WaiterPool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// Iterator over a sealed chain of waiter nodes.
pub(crate) struct Drain<'a> {
    pool: &'a WaiterPool,
    cursor: u32,
}

impl Iterator for Drain<'_> {
    type Item = WaiterRef;

    fn next(&mut self) -> Option<WaiterRef> {
        if self.cursor == END || self.cursor == SEALED {
            return None;
        }
        let index = self.cursor;
        let node = &self.pool.nodes[index as usize];
        let waiter = WaiterRef {
            waiter: Guid::from_raw(node.waiter.load(Ordering::Relaxed)),
            slot: node.slot.load(Ordering::Relaxed),
        };
        self.cursor = node.next.load(Ordering::Relaxed);
        // Fields are read out before the node goes back to the pool.
        self.pool.release(index);
        Some(waiter)
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}

/// Outcome of pushing onto a waiter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    Sealed,
}

/// Head of one event's waiter list.
pub struct WaiterList {
    head: AtomicU32,
}

impl WaiterList {
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(END),
        }
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.head.load(Ordering::Acquire) == SEALED
    }

    /// Push `waiter` unless the list is already sealed.
    ///
    /// A sealed list never gets a node; the caller delivers synchronously.
    pub fn push(
        &self,
        pool: &WaiterPool,
        waiter: WaiterRef,
    ) -> RuntimeResult<Push> {
        let mut head = self.head.load(Ordering::Acquire);
        if head == SEALED {
            return Ok(Push::Sealed);
        }
        let index = pool.acquire(waiter)?;
        let node = &pool.nodes[index as usize];
        loop {
            if head == SEALED {
                pool.release(index);
                return Ok(Push::Sealed);
            }
            node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(head, index, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(Push::Queued),
                Err(actual) => head = actual,
            }
        }
    }

    /// Seal the list and return the chain that was queued on it.
    ///
    /// Returns `None` if the list was sealed already.
    pub fn seal(&self) -> Option<u32> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head == SEALED {
                return None;
            }
            match self
                .head
                .compare_exchange_weak(head, SEALED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(head),
                Err(actual) => head = actual,
            }
        }
    }
}

impl Default for WaiterList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaiterList {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.head.load(Ordering::Relaxed) {
            SEALED => f.write_str("WaiterList(sealed)"),
            END => f.write_str("WaiterList(empty)"),
            head => write!(f, "WaiterList(head={})", head),
        }
    }
}
