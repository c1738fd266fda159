//! Events and synchronization
//!
//! Events are the only way work is ordered: a task waits on events, an event
//! fires once and hands its payload to every waiter.
//!
//! - `Sticky`, `Idem`, `Once`: single-assignment futures. The payload is
//!   written once; a second satisfy is fatal on `Sticky` and `Once` and
//!   ignored on `Idem`. A `Once` event is freed right after its delivery.
//! - `Latch`: a signed counter driven through two slots. The satisfier that
//!   brings it to zero fires it.
//! - `FinishLatch`: the counter behind a finish scope (see [`finish`]).
//!
//! Nothing here blocks. Registration and satisfaction race on the waiter
//! list head; sealing the list decides which side delivers.

pub mod finish;
pub mod waiter;

pub use finish::{FinishLatch, ScopeExit};
pub use waiter::{Push, WaiterList, WaiterPool, WaiterRef};

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::error::{RuntimeError, RuntimeResult};
use super::guid::Guid;


/// Latch slot that decrements the counter.
pub const LATCH_DECR_SLOT: u32 = 0;
/// Latch slot that increments the counter.
pub const LATCH_INCR_SLOT: u32 = 1;

/// Event variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Once,
    Idem,
    Sticky,
    Latch,
    FinishLatch,
}

impl EventKind {
    #[inline]
    pub fn is_single(self) -> bool {
        matches!(self, EventKind::Once | EventKind::Idem | EventKind::Sticky)
    }

    /// Number of slots the event can be satisfied on.
    #[inline]
    pub fn slot_count(self) -> u32 {
        if self.is_single() {
            1
        } else {
            2
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Once => "once",
            EventKind::Idem => "idem",
            EventKind::Sticky => "sticky",
            EventKind::Latch => "latch",
            EventKind::FinishLatch => "finish-latch",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for deliveries made while an event fires.
pub trait Notify {
    /// Hand `data` to `waiter`.
    fn signal(
        &mut self,
        waiter: WaiterRef,
        data: Guid,
    );
}

/// Result of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A node was queued; the satisfier will deliver later.
    Queued,
    /// The event had fired already; this is its payload.
    Resolved(Guid),
}

/// A registration plus the teardown it may imply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    pub registration: Registration,
    /// The caller dropped the last reference to a fired `Once` event and
    /// must free it.
    pub drained: bool,
}

/// Result of a satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfaction {
    /// A latch moved but did not reach zero.
    Counted(i64),
    /// Repeat satisfy on an `Idem` event.
    Ignored,
    /// The waiter list was sealed and every queued waiter signaled.
    Fired {
        delivered: usize,
        /// The satisfier dropped the last reference to a `Once` event and
        /// must free it.
        drained: bool,
    },
    /// A latch came back to zero after it had fired.
    AlreadyFired,
    /// A finish scope closed.
    ScopeClosed(ScopeExit),
}

struct SingleState {
    payload: AtomicU64,
    waiters: WaiterList,
    /// Satisfier plus in-flight registrants. Only used by `Once`.
    refs: AtomicUsize,
}

struct LatchState {
    counter: AtomicI64,
    waiters: WaiterList,
}

enum EventState {
    Single(SingleState),
    Latch(LatchState),
    Finish(FinishLatch),
}

/// A runtime event.
pub struct Event {
    guid: Guid,
    kind: EventKind,
    state: EventState,
}

impl Event {
    /// Create a single-assignment event or a latch.
    pub fn new(
        guid: Guid,
        kind: EventKind,
    ) -> RuntimeResult<Self> {
        let state = match kind {
            EventKind::Once | EventKind::Idem | EventKind::Sticky => {
                EventState::Single(SingleState {
                    payload: AtomicU64::new(Guid::UNSET_RAW),
                    waiters: WaiterList::new(),
                    refs: AtomicUsize::new(1),
                })
            }
            EventKind::Latch => EventState::Latch(LatchState {
                counter: AtomicI64::new(0),
                waiters: WaiterList::new(),
            }),
            EventKind::FinishLatch => {
                return Err(RuntimeError::InvalidArgument(
                    "finish latches are created by finish tasks".into(),
                ))
            }
        };
        Ok(Self { guid, kind, state })
    }

    /// Create the latch behind a finish scope.
    pub(crate) fn finish_latch(
        guid: Guid,
        latch: FinishLatch,
    ) -> Self {
        Self {
            guid,
            kind: EventKind::FinishLatch,
            state: EventState::Finish(latch),
        }
    }

    #[inline]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Finish-scope state, for finish latches.
    pub fn as_finish(&self) -> Option<&FinishLatch> {
        match &self.state {
            EventState::Finish(latch) => Some(latch),
            _ => None,
        }
    }

    /// Payload of a fired single event; `NULL` for a fired latch.
    pub fn value(&self) -> Option<Guid> {
        match &self.state {
            EventState::Single(single) => match single.payload.load(Ordering::Acquire) {
                Guid::UNSET_RAW => None,
                raw => Some(Guid::from_raw(raw)),
            },
            EventState::Latch(latch) => latch.waiters.is_sealed().then_some(Guid::NULL),
            EventState::Finish(_) => None,
        }
    }

    /// Current latch count, for latches and finish latches.
    pub fn count(&self) -> Option<i64> {
        match &self.state {
            EventState::Single(_) => None,
            EventState::Latch(latch) => Some(latch.counter.load(Ordering::Acquire)),
            EventState::Finish(latch) => Some(latch.count()),
        }
    }

    fn check_slot(
        &self,
        slot: u32,
    ) {
        if slot >= self.kind.slot_count() {
            crate::fatal!(
                "slot {} out of range for {} event {} ({} slots)",
                slot,
                self.kind,
                self.guid,
                self.kind.slot_count()
            );
        }
    }

    /// Register `waiter` on this event.
    pub fn register_waiter(
        &self,
        pool: &WaiterPool,
        waiter: WaiterRef,
    ) -> RuntimeResult<Registered> {
        match &self.state {
            EventState::Single(single) => {
                let once = self.kind == EventKind::Once;
                if once {
                    single.refs.fetch_add(1, Ordering::AcqRel);
                }
                let pushed = single.waiters.push(pool, waiter);
                let drained = once && single.refs.fetch_sub(1, Ordering::AcqRel) == 1;
                let registration = match pushed? {
                    Push::Queued => Registration::Queued,
                    Push::Sealed => match single.payload.load(Ordering::Acquire) {
                        // Sealed without a payload: the event was destroyed.
                        Guid::UNSET_RAW => return Err(RuntimeError::StaleHandle(self.guid)),
                        raw => Registration::Resolved(Guid::from_raw(raw)),
                    },
                };
                trace!("{} registered on {} event {}: {:?}", waiter, self.kind, self.guid, registration);
                Ok(Registered {
                    registration,
                    drained,
                })
            }
            EventState::Latch(latch) => {
                let registration = match latch.waiters.push(pool, waiter)? {
                    Push::Queued => Registration::Queued,
                    Push::Sealed => Registration::Resolved(Guid::NULL),
                };
                trace!("{} registered on latch {}: {:?}", waiter, self.guid, registration);
                Ok(Registered {
                    registration,
                    drained: false,
                })
            }
            EventState::Finish(_) => Err(RuntimeError::InvalidArgument(format!(
                "finish latch {} does not accept waiters",
                self.guid
            ))),
        }
    }

    /// Satisfy the event on `slot` with `data`.
    ///
    /// Every waiter queued before the seal is handed to `notify`.
    pub fn satisfy(
        &self,
        pool: &WaiterPool,
        data: Guid,
        slot: u32,
        notify: &mut dyn Notify,
    ) -> RuntimeResult<Satisfaction> {
        self.check_slot(slot);
        if data.raw() == Guid::UNSET_RAW {
            return Err(RuntimeError::InvalidArgument(format!(
                "{} is not a valid payload",
                data
            )));
        }

        match &self.state {
            EventState::Single(single) => self.satisfy_single(single, pool, data, notify),
            EventState::Latch(latch) => {
                let delta = latch_delta(slot);
                let now = latch.counter.fetch_add(delta, Ordering::AcqRel) + delta;
                trace!("latch {} count {}", self.guid, now);
                if now != 0 {
                    return Ok(Satisfaction::Counted(now));
                }
                let Some(head) = latch.waiters.seal() else {
                    debug!("latch {} back at zero after firing", self.guid);
                    return Ok(Satisfaction::AlreadyFired);
                };
                let delivered = deliver(pool, head, Guid::NULL, notify);
                debug!("latch {} fired, {} waiters signaled", self.guid, delivered);
                Ok(Satisfaction::Fired {
                    delivered,
                    drained: false,
                })
            }
            EventState::Finish(latch) => match latch.apply(self.guid, latch_delta(slot)) {
                Some(exit) => {
                    debug!("finish scope {} of {} closed", self.guid, exit.owner);
                    Ok(Satisfaction::ScopeClosed(exit))
                }
                None => Ok(Satisfaction::Counted(latch.count())),
            },
        }
    }

    fn satisfy_single(
        &self,
        single: &SingleState,
        pool: &WaiterPool,
        data: Guid,
        notify: &mut dyn Notify,
    ) -> RuntimeResult<Satisfaction> {
        if let Err(previous) = single.payload.compare_exchange(
            Guid::UNSET_RAW,
            data.raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            if self.kind == EventKind::Idem {
                trace!("idem event {} already satisfied, ignoring", self.guid);
                return Ok(Satisfaction::Ignored);
            }
            crate::fatal!(
                "{} event {} satisfied twice (holds {}, got {})",
                self.kind,
                self.guid,
                Guid::from_raw(previous),
                data
            );
        }

        let delivered = match single.waiters.seal() {
            Some(head) => deliver(pool, head, data, notify),
            None => 0,
        };
        let drained =
            self.kind == EventKind::Once && single.refs.fetch_sub(1, Ordering::AcqRel) == 1;
        debug!(
            "{} event {} satisfied with {}, {} waiters signaled",
            self.kind, self.guid, data, delivered
        );
        Ok(Satisfaction::Fired { delivered, drained })
    }

    /// Seal the waiter list for destruction and drop whatever is queued.
    ///
    /// Returns how many waiters lost their delivery.
    pub(crate) fn discard(
        &self,
        pool: &WaiterPool,
    ) -> usize {
        let waiters = match &self.state {
            EventState::Single(single) => &single.waiters,
            EventState::Latch(latch) => &latch.waiters,
            EventState::Finish(_) => return 0,
        };
        let dropped = waiters.seal().map_or(0, |head| pool.drain(head).count());
        if dropped > 0 {
            warn!("event {} destroyed with {} pending waiters", self.guid, dropped);
        }
        dropped
    }
}

#[inline]
fn latch_delta(slot: u32) -> i64 {
    if slot == LATCH_INCR_SLOT {
        1
    } else {
        -1
    }
}

fn deliver(
    pool: &WaiterPool,
    head: u32,
    data: Guid,
    notify: &mut dyn Notify,
) -> usize {
    let mut delivered = 0;
    for waiter in pool.drain(head) {
        notify.signal(waiter, data);
        delivered += 1;
    }
    delivered
}

impl fmt::Debug for Event {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Event")
            .field("guid", &self.guid)
            .field("kind", &self.kind)
            .field("value", &self.value())
            .field("count", &self.count())
            .finish()
    }
}
