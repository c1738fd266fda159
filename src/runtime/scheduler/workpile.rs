//! Per-worker workpiles
//!
//! The owning worker pushes and pops at one end (LIFO); thieves take from the
//! other end (FIFO) through a [`WorkpileStealer`]. Backed by the
//! Chase-Lev deque from `crossbeam::deque`.

use std::fmt;

use crossbeam::deque::{Steal, Stealer, Worker};

use crate::runtime::guid::Guid;

/// Owner end of a workpile. Not `Sync`: it lives in one worker's context.
pub struct Workpile {
    inner: Worker<Guid>,
}

impl Workpile {
    /// Create a new empty workpile.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Worker::new_lifo(),
        }
    }

    /// Push a ready task.
    #[inline]
    pub fn push(
        &self,
        task: Guid,
    ) {
        self.inner.push(task);
    }

    /// Pop the most recently pushed task.
    #[inline]
    pub fn pop(&self) -> Option<Guid> {
        self.inner.pop()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Thief end of this workpile.
    pub fn stealer(&self) -> WorkpileStealer {
        WorkpileStealer {
            inner: self.inner.stealer(),
        }
    }
}

impl Default for Workpile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Workpile {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Workpile").field("len", &self.len()).finish()
    }
}

/// Thief end of a workpile.
#[derive(Clone)]
pub struct WorkpileStealer {
    inner: Stealer<Guid>,
}

impl WorkpileStealer {
    /// Steal the oldest task. Contended attempts are retried.
    pub fn steal(&self) -> Option<Guid> {
        loop {
            match self.inner.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl fmt::Debug for WorkpileStealer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WorkpileStealer")
            .field("len", &self.len())
            .finish()
    }
}
