//! Runtime system
//!
//! Events, tasks with a dependency frontier, finish scopes, data blocks and
//! the work-stealing scheduler, tied together by the policy domain.

pub(crate) mod arena;
pub mod datablock;
pub mod error;
pub mod event;
pub mod guid;
pub mod memory;
pub mod policy;
pub mod scheduler;
pub mod task;
pub mod worker;

pub use datablock::DataBlock;
pub use error::{RuntimeError, RuntimeResult};
pub use event::{EventKind, LATCH_DECR_SLOT, LATCH_INCR_SLOT};
pub use guid::{Guid, GuidKind, GuidProvider};
pub use policy::{PolicyDomain, PolicyMsg, TaskCall};
pub use scheduler::SchedulerSnapshot;
pub use task::{TaskHandles, TaskProps, TaskSpec, TaskTemplate};
pub use worker::{Runtime, WorkerContext};
