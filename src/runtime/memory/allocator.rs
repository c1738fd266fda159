//! Allocator interface for data block storage
//!
//! Data blocks never talk to the system allocator directly; they go through
//! an [`Allocator`] so a pooled or NUMA-aware allocator can be swapped in.
//!
//! # Design Principles
//! - Simple trait: allocate / release
//! - Buffers are zeroed on allocation
//! - Send + Sync, shared by every worker

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Owned backing storage of a data block.
pub type BlockBuffer = Box<[u8]>;

/// Memory allocation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The allocation would exceed the configured budget
    OutOfMemory {
        requested: usize,
        available: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AllocError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {} bytes, {} available",
                requested, available
            ),
        }
    }
}

impl std::error::Error for AllocError {}

/// Core allocator trait
///
/// # Implementations
/// - `SystemAllocator`: global heap with an optional byte budget
pub trait Allocator: Send + Sync + fmt::Debug {
    /// Allocate a zeroed buffer of `size` bytes.
    fn allocate(
        &self,
        size: usize,
    ) -> Result<BlockBuffer, AllocError>;

    /// Give a buffer back.
    ///
    /// `buffer` must come from a previous `allocate` call on the same allocator.
    fn release(
        &self,
        buffer: BlockBuffer,
    );

    /// Bytes currently handed out.
    fn in_use(&self) -> usize;
}

/// Global-heap allocator with an optional budget.
///
/// The budget is enforced with a CAS loop on the in-use counter, so
/// concurrent allocations never overshoot it.
#[derive(Debug, Default)]
pub struct SystemAllocator {
    budget: Option<usize>,
    in_use: AtomicUsize,
}

impl SystemAllocator {
    /// Allocator without a budget.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that refuses to hand out more than `budget` bytes at once.
    #[inline]
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Configured budget, if any.
    #[inline]
    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    fn charge(
        &self,
        size: usize,
    ) -> Result<(), AllocError> {
        let Some(budget) = self.budget else {
            self.in_use.fetch_add(size, Ordering::Relaxed);
            return Ok(());
        };
        let mut current = self.in_use.load(Ordering::Relaxed);
        loop {
            let available = budget.saturating_sub(current);
            if size > available {
                return Err(AllocError::OutOfMemory {
                    requested: size,
                    available,
                });
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + size,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Allocator for SystemAllocator {
    fn allocate(
        &self,
        size: usize,
    ) -> Result<BlockBuffer, AllocError> {
        self.charge(size)?;
        Ok(vec![0u8; size].into_boxed_slice())
    }

    fn release(
        &self,
        buffer: BlockBuffer,
    ) {
        self.in_use.fetch_sub(buffer.len(), Ordering::AcqRel);
    }

    fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }
}
