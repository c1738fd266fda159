//! flowrt: a dataflow task runtime
//!
//! Work is expressed as tasks that wait on events. A task runs once every
//! dependency has been satisfied, on whichever worker takes it; idle workers
//! steal from the others. Finish tasks open scopes whose output fires only
//! after everything started inside them has completed.
//!
//! # Example
//!
//! ```no_run
//! use flowrt::{EventKind, Guid, Runtime, RuntimeConfig, TaskSpec, TaskTemplate};
//!
//! fn main() -> flowrt::RuntimeResult<()> {
//!     let mut runtime = Runtime::new(&RuntimeConfig::with_workers(4))?;
//!     runtime.run(|domain, ctx| {
//!         let hello = domain.create_template(TaskTemplate::new("hello", 0, 1, |call| {
//!             tracing::info!("hello from worker {}", call.worker());
//!             call.shutdown();
//!             Guid::NULL
//!         }))?;
//!         let go = domain.create_event(EventKind::Sticky)?;
//!         domain.create_task(ctx, TaskSpec::new(hello).deps([go]))?;
//!         domain.satisfy(ctx, go, Guid::NULL)
//!     })
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod util;
pub mod workload;

pub use runtime::{
    EventKind, Guid, PolicyDomain, PolicyMsg, Runtime, RuntimeError, RuntimeResult, TaskCall,
    TaskHandles, TaskProps, TaskSpec, TaskTemplate, WorkerContext, LATCH_DECR_SLOT,
    LATCH_INCR_SLOT,
};
pub use util::config::RuntimeConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "flowrt";
