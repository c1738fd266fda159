//! Finish-scope latches
//!
//! A finish task owns a latch that counts the work started inside its scope:
//! the owner itself, every task created while the scope is active, and every
//! nested scope. When the count returns to zero the scope is closed exactly
//! once; the policy domain then carries out the [`ScopeExit`].

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use tracing::trace;

use super::waiter::WaiterRef;
use crate::runtime::guid::Guid;

/// Work to carry out after a scope's count returned to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeExit {
    /// Finish task that opened the scope.
    pub owner: Guid,
    /// Waiter to hand the owner's return value to.
    pub output: Option<WaiterRef>,
    /// Return value captured from the owner.
    pub value: Guid,
    /// Enclosing scope to check out of.
    pub parent: Option<Guid>,
}

pub struct FinishLatch {
    counter: AtomicI64,
    owner: Guid,
    output: Option<WaiterRef>,
    parent: Option<Guid>,
    value: AtomicU64,
}

impl FinishLatch {
    pub(crate) fn new(
        owner: Guid,
        output: Option<WaiterRef>,
        parent: Option<Guid>,
    ) -> Self {
        Self {
            counter: AtomicI64::new(0),
            owner,
            output,
            parent,
            value: AtomicU64::new(Guid::NULL.raw()),
        }
    }

    #[inline]
    pub fn owner(&self) -> Guid {
        self.owner
    }

    #[inline]
    pub fn parent(&self) -> Option<Guid> {
        self.parent
    }

    #[inline]
    pub fn output(&self) -> Option<WaiterRef> {
        self.output
    }

    #[inline]
    pub fn count(&self) -> i64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Remember the owner's return value for the output waiter.
    pub(crate) fn set_return_value(
        &self,
        value: Guid,
    ) {
        self.value.store(value.raw(), Ordering::Release);
    }

    /// Apply a check-in (`+1`) or check-out (`-1`).
    ///
    /// Returns the scope exit when this call brought the count to zero.
    pub(crate) fn apply(
        &self,
        latch: Guid,
        delta: i64,
    ) -> Option<ScopeExit> {
        let now = self.counter.fetch_add(delta, Ordering::AcqRel) + delta;
        trace!("finish latch {} count {}", latch, now);
        if now < 0 {
            crate::fatal!("finish latch {} checked out more often than checked in", latch);
        }
        (now == 0).then(|| ScopeExit {
            owner: self.owner,
            output: self.output,
            value: Guid::from_raw(self.value.load(Ordering::Acquire)),
            parent: self.parent,
        })
    }
}

impl std::fmt::Debug for FinishLatch {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FinishLatch")
            .field("count", &self.count())
            .field("owner", &self.owner)
            .field("parent", &self.parent)
            .finish()
    }
}
