//! Work-stealing scheduler
//!
//! Workers map 1:1 onto workpiles. A worker gives ready tasks to its own
//! workpile and takes from it LIFO; when it runs dry it steals FIFO from the
//! others in round-robin order. There is no fairness guarantee across
//! workers.

pub mod work_stealer;
pub mod workpile;

pub use work_stealer::{victims, StealStats, WorkStealer};
pub use workpile::{Workpile, WorkpileStealer};

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::runtime::guid::Guid;
use crate::runtime::worker::WorkerContext;


/// Scheduler statistics.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Tasks pushed through `give`.
    pub tasks_given: AtomicUsize,
    /// Tasks popped from the caller's own workpile.
    pub tasks_taken_local: AtomicUsize,
    /// Tasks run to completion.
    pub tasks_executed: AtomicUsize,
}

impl SchedulerStats {
    /// Record given tasks.
    #[inline]
    pub fn record_given(
        &self,
        count: usize,
    ) {
        self.tasks_given.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a local take.
    #[inline]
    pub fn record_local(&self) {
        self.tasks_taken_local.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an executed task.
    #[inline]
    pub fn record_executed(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub workers: usize,
    pub given: usize,
    pub taken_local: usize,
    pub stolen: usize,
    pub empty_steal_cycles: usize,
    pub executed: usize,
    pub steal_success_rate: f64,
}

/// Round-robin work-stealing scheduler over per-worker workpiles.
#[derive(Debug)]
pub struct Scheduler {
    stealer: WorkStealer,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler for `num_workers` workers.
    ///
    /// Returns the owner ends of the workpiles, indexed by worker id; each
    /// belongs in the matching worker's context.
    pub fn new(num_workers: usize) -> (Self, Vec<Workpile>) {
        let workpiles: Vec<_> = (0..num_workers).map(|_| Workpile::new()).collect();
        let stealers = workpiles.iter().map(|w| w.stealer()).collect();
        let scheduler = Self {
            stealer: WorkStealer::new(stealers),
            stats: SchedulerStats::default(),
        };
        (scheduler, workpiles)
    }

    /// Get the number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.stealer.num_workers()
    }

    /// Next task for the calling worker, or `None` after a full empty
    /// steal cycle.
    pub fn take(
        &self,
        ctx: &WorkerContext,
    ) -> Option<Guid> {
        if let Some(task) = ctx.workpile().pop() {
            self.stats.record_local();
            trace!("worker {} took {}", ctx.id(), task);
            return Some(task);
        }
        let stolen = self.stealer.steal_round_robin(ctx.id());
        if let Some(task) = stolen {
            trace!("worker {} stole {}", ctx.id(), task);
        }
        stolen
    }

    /// Push ready tasks onto the calling worker's workpile.
    pub fn give(
        &self,
        ctx: &WorkerContext,
        tasks: &[Guid],
    ) {
        for &task in tasks {
            ctx.workpile().push(task);
        }
        self.stats.record_given(tasks.len());
        trace!("worker {} given {} task(s)", ctx.id(), tasks.len());
    }

    /// Tasks waiting in all workpiles. Only a hint under concurrency.
    pub fn pending(&self) -> usize {
        self.stealer.pending()
    }

    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let steal = self.stealer.stats();
        SchedulerSnapshot {
            workers: self.num_workers(),
            given: self.stats.tasks_given.load(Ordering::Relaxed),
            taken_local: self.stats.tasks_taken_local.load(Ordering::Relaxed),
            stolen: steal.steal_successes.load(Ordering::Relaxed),
            empty_steal_cycles: steal.steal_failures.load(Ordering::Relaxed),
            executed: self.stats.tasks_executed.load(Ordering::Relaxed),
            steal_success_rate: steal.success_rate(),
        }
    }
}
