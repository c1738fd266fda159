//! Worker threads
//!
//! Each worker owns one workpile and runs a fetch, execute, resolve loop
//! against the shared [`PolicyDomain`] until shutdown is requested. The
//! calling thread doubles as worker 0.

use std::fmt;
use std::panic;
use std::sync::Arc;
use std::thread;

use crossbeam::utils::Backoff;
use tracing::{debug, error, info};

use crate::runtime::error::RuntimeResult;
use crate::runtime::guid::Guid;
use crate::runtime::policy::PolicyDomain;
use crate::runtime::scheduler::{SchedulerSnapshot, Workpile};
use crate::util::config::RuntimeConfig;

#[cfg(test)]
mod tests;

/// Per-worker execution context.
///
/// Passed explicitly to every operation that may make a task ready, so the
/// ready task lands on this worker's workpile.
pub struct WorkerContext {
    id: usize,
    workpile: Workpile,
    current: Option<Guid>,
}

impl WorkerContext {
    pub fn new(
        id: usize,
        workpile: Workpile,
    ) -> Self {
        Self {
            id,
            workpile,
            current: None,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Owner end of this worker's workpile.
    #[inline]
    pub fn workpile(&self) -> &Workpile {
        &self.workpile
    }

    /// Task currently executing on this worker.
    #[inline]
    pub fn current_task(&self) -> Option<Guid> {
        self.current
    }

    pub(crate) fn enter(
        &mut self,
        task: Guid,
    ) -> Option<Guid> {
        self.current.replace(task)
    }

    pub(crate) fn leave(
        &mut self,
        previous: Option<Guid>,
    ) {
        self.current = previous;
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("id", &self.id)
            .field("queued", &self.workpile.len())
            .field("current", &self.current)
            .finish()
    }
}

/// Requests shutdown when dropped, so a panicking worker does not leave the
/// others spinning.
struct ShutdownOnDrop<'a>(&'a PolicyDomain);

impl Drop for ShutdownOnDrop<'_> {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// A policy domain plus the worker contexts that drive it.
pub struct Runtime {
    domain: Arc<PolicyDomain>,
    contexts: Vec<WorkerContext>,
}

impl Runtime {
    pub fn new(config: &RuntimeConfig) -> RuntimeResult<Self> {
        let (domain, contexts) = PolicyDomain::new(config)?;
        info!("runtime ready with {} workers", contexts.len());
        Ok(Self {
            domain: Arc::new(domain),
            contexts,
        })
    }

    #[inline]
    pub fn domain(&self) -> &Arc<PolicyDomain> {
        &self.domain
    }

    pub fn num_workers(&self) -> usize {
        self.contexts.len()
    }

    pub fn stats(&self) -> SchedulerSnapshot {
        self.domain.stats()
    }

    /// Run `main` on worker 0, then drive every worker until shutdown.
    ///
    /// `main` builds the initial graph; some task in it must eventually
    /// call `shutdown`. If `main` fails, the workers are stopped and its
    /// error is returned. A panicking worker is re-raised on the caller.
    pub fn run<T, F>(
        &mut self,
        main: F,
    ) -> RuntimeResult<T>
    where
        F: FnOnce(&PolicyDomain, &mut WorkerContext) -> RuntimeResult<T>,
    {
        let domain: &PolicyDomain = &self.domain;
        let idle = domain.config().idle_timeout();
        let Some((first, rest)) = self.contexts.split_first_mut() else {
            return main(domain, &mut WorkerContext::new(0, Workpile::new()));
        };

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(rest.len());
            for ctx in rest.iter_mut() {
                let spawned = thread::Builder::new()
                    .name(format!("flow-worker-{}", ctx.id()))
                    .spawn_scoped(scope, move || {
                        let _guard = ShutdownOnDrop(domain);
                        worker_loop(domain, ctx, idle)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!("failed to spawn worker thread: {}", e);
                        domain.shutdown();
                        break;
                    }
                }
            }

            let result = {
                let _guard = ShutdownOnDrop(domain);
                main(domain, first).and_then(|value| {
                    worker_loop(domain, first, idle)?;
                    Ok(value)
                })
            };
            if result.is_err() {
                domain.shutdown();
            }

            let mut outcome = result;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(executed)) => debug!("worker exited after {} tasks", executed),
                    Ok(Err(e)) => {
                        if outcome.is_ok() {
                            outcome = Err(e);
                        }
                    }
                    Err(payload) => panic::resume_unwind(payload),
                }
            }
            outcome
        })
    }
}

impl fmt::Debug for Runtime {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("domain", &self.domain)
            .field("contexts", &self.contexts)
            .finish()
    }
}

/// Fetch, execute, resolve until shutdown. Returns the number of tasks run.
fn worker_loop(
    domain: &PolicyDomain,
    ctx: &mut WorkerContext,
    idle: std::time::Duration,
) -> RuntimeResult<usize> {
    debug!("worker {} started", ctx.id());
    let backoff = Backoff::new();
    let mut executed = 0;

    while !domain.is_shutting_down() {
        match domain.take(ctx) {
            Some(task) => {
                if let Err(e) = domain.execute_task(ctx, task) {
                    error!("worker {}: task {} failed: {}", ctx.id(), task, e);
                    domain.shutdown();
                    return Err(e);
                }
                executed += 1;
                backoff.reset();
            }
            None => {
                if let Err(e) = domain.resume_stalled(ctx) {
                    error!("worker {}: resuming stalled tasks failed: {}", ctx.id(), e);
                    domain.shutdown();
                    return Err(e);
                }
                if backoff.is_completed() {
                    thread::sleep(idle);
                } else {
                    backoff.snooze();
                }
            }
        }
    }

    debug!("worker {} stopping after {} tasks", ctx.id(), executed);
    Ok(executed)
}
