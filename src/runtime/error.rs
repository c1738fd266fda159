//! Runtime error types
//!
//! Recoverable conditions (exhausted pools, stale handles, bad arguments) are
//! reported through [`RuntimeError`]. Protocol violations are not errors: they
//! go through [`fatal!`](crate::fatal) and abort the calling thread.

use thiserror::Error;

use super::datablock::DataBlockError;
use super::guid::{Guid, GuidKind};
use super::memory::AllocError;

/// Errors surfaced to callers of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A fixed-capacity pool ran out of entries.
    #[error("{resource} exhausted (capacity {capacity})")]
    ResourceExhausted {
        /// Which pool ran dry.
        resource: &'static str,
        /// Its configured capacity.
        capacity: usize,
    },

    /// The handle was never issued or its object has been released.
    #[error("stale or unknown handle {0}")]
    StaleHandle(Guid),

    /// The handle resolved to an object of an unexpected kind.
    #[error("handle {guid} refers to a {found}, expected a {expected}")]
    WrongKind {
        guid: Guid,
        expected: GuidKind,
        found: GuidKind,
    },

    /// The caller passed arguments the runtime cannot act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing storage for a data block could not be obtained.
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// A data block refused an acquire, release or free.
    #[error(transparent)]
    DataBlock(#[from] DataBlockError),

    /// The runtime no longer accepts work.
    #[error("runtime is shutting down")]
    ShuttingDown,
}

/// Result alias used throughout the runtime.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Report a protocol violation and abort the current thread.
///
/// Protocol violations are caller bugs (double satisfy of a sticky event, a
/// slot outside an event's range, running a task whose dependencies are not
/// all resolved). They are logged at `error` level and then panic.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::error!("protocol violation: {}", message);
        panic!("protocol violation: {}", message)
    }};
}
