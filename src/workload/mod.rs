//! Demonstration workloads
//!
//! Small task graphs used by the CLI and the integration tests:
//!
//! - `chain`: `len` tasks, each waiting on the output of the previous one,
//!   bumping a counter kept in a shared data block.
//! - `tree`: nested finish scopes `depth` levels deep with `fanout` children
//!   per node; every leaf bumps the counter.
//!
//! Both end with a task that reads the counter and shuts the runtime down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::runtime::datablock::DataBlock;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::event::EventKind;
use crate::runtime::guid::Guid;
use crate::runtime::policy::{PolicyDomain, TaskCall};
use crate::runtime::scheduler::SchedulerSnapshot;
use crate::runtime::task::{TaskSpec, TaskTemplate};
use crate::runtime::worker::{Runtime, WorkerContext};
use crate::util::config::RuntimeConfig;

#[cfg(test)]
mod tests;

const COUNTER_BYTES: usize = 8;

/// Outcome of a workload run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub workload: String,
    pub workers: usize,
    /// Tasks created, including the final one.
    pub tasks: u64,
    /// Counter value read by the final task.
    pub result: u64,
    pub expected: u64,
    pub elapsed_ms: f64,
    pub stats: SchedulerSnapshot,
}

impl WorkloadReport {
    #[inline]
    pub fn is_correct(&self) -> bool {
        self.result == self.expected
    }
}

fn bump(block: &DataBlock) {
    let mut bytes = block.write();
    let mut counter = [0u8; COUNTER_BYTES];
    counter.copy_from_slice(&bytes[..COUNTER_BYTES]);
    let next = u64::from_le_bytes(counter) + 1;
    bytes[..COUNTER_BYTES].copy_from_slice(&next.to_le_bytes());
}

fn read(block: &DataBlock) -> u64 {
    let bytes = block.read();
    let mut counter = [0u8; COUNTER_BYTES];
    counter.copy_from_slice(&bytes[..COUNTER_BYTES]);
    u64::from_le_bytes(counter)
}

/// Template of the final task: dependency 0 is the counter block, the
/// remaining ones gate it.
fn finisher(
    domain: &PolicyDomain,
    depc: usize,
    result: Arc<AtomicU64>,
) -> RuntimeResult<Guid> {
    domain.create_template(TaskTemplate::new("finish", 0, depc, move |call| {
        if let Some(block) = call.block(0) {
            result.store(read(block), Ordering::SeqCst);
        }
        call.shutdown();
        Guid::NULL
    }))
}

fn execute<F>(
    config: &RuntimeConfig,
    workload: &str,
    expected: u64,
    build: F,
) -> RuntimeResult<WorkloadReport>
where
    F: FnOnce(&PolicyDomain, &mut WorkerContext, Arc<AtomicU64>) -> RuntimeResult<u64>,
{
    let mut runtime = Runtime::new(config)?;
    let result = Arc::new(AtomicU64::new(0));
    let sink = result.clone();

    info!("running {} workload on {} workers", workload, runtime.num_workers());
    let start = Instant::now();
    let tasks = runtime.run(move |domain, ctx| build(domain, ctx, sink))?;
    let elapsed = start.elapsed();

    let report = WorkloadReport {
        workload: workload.to_string(),
        workers: runtime.num_workers(),
        tasks,
        result: result.load(Ordering::SeqCst),
        expected,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        stats: runtime.stats(),
    };
    if report.is_correct() {
        info!("{} finished in {:.3} ms", workload, report.elapsed_ms);
    } else {
        warn!("{} counted {} instead of {}", workload, report.result, report.expected);
    }
    Ok(report)
}

/// Run a chain of `len` dependent tasks.
pub fn run_chain(
    config: &RuntimeConfig,
    len: u64,
) -> RuntimeResult<WorkloadReport> {
    execute(config, "chain", len, move |domain, ctx, result| {
        let counter = domain.create_datablock(COUNTER_BYTES)?;
        let step = domain.create_template(TaskTemplate::new("step", 0, 2, |call| {
            if let Some(block) = call.block(0) {
                bump(block);
            }
            Guid::NULL
        }))?;
        let finish = finisher(domain, 2, result)?;

        let start = domain.create_event(EventKind::Sticky)?;
        let mut previous = start;
        for _ in 0..len {
            let handles = domain.create_task(
                ctx,
                TaskSpec::new(step).deps([counter, previous]).with_output(),
            )?;
            previous = handles
                .output
                .ok_or_else(|| RuntimeError::InvalidArgument("step has no output event".into()))?;
        }
        domain.create_task(ctx, TaskSpec::new(finish).deps([counter, previous]))?;

        // Nothing runs before the whole chain is wired.
        domain.satisfy(ctx, start, Guid::NULL)?;
        Ok(len + 1)
    })
}

/// Body of a tree node. Parameters: remaining depth, fanout and the node
/// template's own handle.
fn tree_node(call: &mut TaskCall<'_>) {
    let (Some(depth), Some(fanout), Some(node), Some(counter)) =
        (call.param(0), call.param(1), call.param(2), call.dep(0).map(|d| d.guid))
    else {
        warn!("task {} is missing its tree arguments", call.guid());
        return;
    };
    let node = Guid::from_raw(node);
    if depth == 0 {
        if let Some(block) = call.block(0) {
            bump(block);
        }
        return;
    }
    for _ in 0..fanout {
        let spec = TaskSpec::new(node)
            .params([depth - 1, fanout, node.raw()])
            .deps([counter])
            .finish();
        if let Err(e) = call.spawn(spec) {
            warn!("task {} could not spawn a child: {}", call.guid(), e);
            return;
        }
    }
}

/// Run a tree of nested finish scopes; `fanout^depth` leaves.
pub fn run_tree(
    config: &RuntimeConfig,
    depth: u32,
    fanout: u64,
) -> RuntimeResult<WorkloadReport> {
    let leaves = fanout.checked_pow(depth).ok_or_else(|| {
        RuntimeError::InvalidArgument(format!("tree {}^{} is too large", fanout, depth))
    })?;
    let tasks = (0..=depth)
        .try_fold(0u64, |acc, level| acc.checked_add(fanout.checked_pow(level)?))
        .ok_or_else(|| RuntimeError::InvalidArgument("tree is too large".into()))?;

    execute(config, "tree", leaves, move |domain, ctx, result| {
        let counter = domain.create_datablock(COUNTER_BYTES)?;
        let node = domain.create_template(TaskTemplate::new("node", 3, 1, |call| {
            tree_node(call);
            Guid::NULL
        }))?;
        let finish = finisher(domain, 2, result)?;

        let root = domain.create_task(
            ctx,
            TaskSpec::new(node)
                .params([u64::from(depth), fanout, node.raw()])
                .deps([counter])
                .finish()
                .with_output(),
        )?;
        let done = root
            .output
            .ok_or_else(|| RuntimeError::InvalidArgument("root has no output event".into()))?;
        domain.create_task(ctx, TaskSpec::new(finish).deps([counter, done]))?;
        Ok(tasks + 1)
    })
}
