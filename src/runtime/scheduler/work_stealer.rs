//! Work stealing for load balancing across worker threads.
//!
//! An idle worker visits every other workpile once, in round-robin order
//! starting with its right neighbour, and takes the first task it finds.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::workpile::WorkpileStealer;
use crate::runtime::guid::Guid;

/// Statistics about work stealing operations.
#[derive(Debug, Default)]
pub struct StealStats {
    /// Number of successful steals.
    pub steal_successes: AtomicUsize,
    /// Number of steal cycles that found nothing.
    pub steal_failures: AtomicUsize,
    /// Total number of victims visited.
    pub victims_visited: AtomicUsize,
}

impl StealStats {
    /// Record a successful steal.
    #[inline]
    pub fn record_success(
        &self,
        visited: usize,
    ) {
        self.steal_successes.fetch_add(1, Ordering::Relaxed);
        self.victims_visited.fetch_add(visited, Ordering::Relaxed);
    }

    /// Record a full cycle without success.
    #[inline]
    pub fn record_failure(
        &self,
        visited: usize,
    ) {
        self.steal_failures.fetch_add(1, Ordering::Relaxed);
        self.victims_visited.fetch_add(visited, Ordering::Relaxed);
    }

    /// Get success rate as a fraction.
    pub fn success_rate(&self) -> f64 {
        let successes = self.steal_successes.load(Ordering::Relaxed);
        let total = successes + self.steal_failures.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        successes as f64 / total as f64
    }
}

/// Victims visited by `thief`, in order: `thief+1, thief+2, ...` modulo the
/// worker count, never `thief` itself.
pub fn victims(
    thief: usize,
    num_workers: usize,
) -> impl Iterator<Item = usize> {
    (1..num_workers).map(move |offset| (thief + offset) % num_workers)
}

/// Thief ends of every workpile, indexed by worker id.
#[derive(Debug)]
pub struct WorkStealer {
    stealers: Box<[WorkpileStealer]>,
    stats: StealStats,
}

impl WorkStealer {
    pub fn new(stealers: Vec<WorkpileStealer>) -> Self {
        Self {
            stealers: stealers.into_boxed_slice(),
            stats: StealStats::default(),
        }
    }

    /// Get the number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.stealers.len()
    }

    /// One round-robin steal cycle on behalf of `thief`.
    pub fn steal_round_robin(
        &self,
        thief: usize,
    ) -> Option<Guid> {
        let mut visited = 0;
        for victim in victims(thief, self.stealers.len()) {
            visited += 1;
            if let Some(task) = self.stealers[victim].steal() {
                self.stats.record_success(visited);
                return Some(task);
            }
        }
        self.stats.record_failure(visited);
        None
    }

    /// Tasks sitting in every workpile. Only a hint under concurrency.
    pub fn pending(&self) -> usize {
        self.stealers.iter().map(|s| s.len()).sum()
    }

    /// Get steal statistics.
    #[inline]
    pub fn stats(&self) -> &StealStats {
        &self.stats
    }
}
