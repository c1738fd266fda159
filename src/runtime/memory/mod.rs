//! Backing storage for data blocks
//!
//! The runtime only depends on the [`Allocator`] trait. [`SystemAllocator`]
//! is the stand-in shipped with the crate: it uses the global heap and can
//! enforce a byte budget so exhaustion paths are testable.

mod allocator;

pub use allocator::{AllocError, Allocator, BlockBuffer, SystemAllocator};
