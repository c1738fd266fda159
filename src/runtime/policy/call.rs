//! The view a running task has of the runtime

use std::sync::Arc;

use super::PolicyDomain;
use crate::runtime::datablock::DataBlock;
use crate::runtime::error::RuntimeResult;
use crate::runtime::event::EventKind;
use crate::runtime::guid::Guid;
use crate::runtime::task::{Task, TaskHandles, TaskSpec};
use crate::runtime::worker::WorkerContext;

/// One resolved dependency slot.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Payload delivered to the slot.
    pub guid: Guid,
    /// The data block behind the payload, acquired for this call.
    pub block: Option<Arc<DataBlock>>,
}

/// Argument handed to a task's user function.
///
/// Gives access to the parameters and dependencies, and lets the function
/// create and satisfy events, spawn tasks and manage data blocks on the
/// worker it runs on.
pub struct TaskCall<'a> {
    domain: &'a PolicyDomain,
    ctx: &'a mut WorkerContext,
    task: &'a Task,
    deps: &'a [Dependency],
}

impl<'a> TaskCall<'a> {
    pub(crate) fn new(
        domain: &'a PolicyDomain,
        ctx: &'a mut WorkerContext,
        task: &'a Task,
        deps: &'a [Dependency],
    ) -> Self {
        Self {
            domain,
            ctx,
            task,
            deps,
        }
    }

    /// Handle of the running task.
    #[inline]
    pub fn guid(&self) -> Guid {
        self.task.guid()
    }

    #[inline]
    pub fn params(&self) -> &[u64] {
        self.task.params()
    }

    /// Parameter `index`, `None` when out of range.
    #[inline]
    pub fn param(
        &self,
        index: usize,
    ) -> Option<u64> {
        self.task.params().get(index).copied()
    }

    #[inline]
    pub fn deps(&self) -> &[Dependency] {
        self.deps
    }

    #[inline]
    pub fn dep(
        &self,
        index: usize,
    ) -> Option<&Dependency> {
        self.deps.get(index)
    }

    /// Data block delivered on slot `index`, if the payload was one.
    pub fn block(
        &self,
        index: usize,
    ) -> Option<&Arc<DataBlock>> {
        self.deps.get(index).and_then(|d| d.block.as_ref())
    }

    /// Worker the task runs on.
    #[inline]
    pub fn worker(&self) -> usize {
        self.ctx.id()
    }

    #[inline]
    pub fn domain(&self) -> &PolicyDomain {
        self.domain
    }

    pub fn create_event(
        &mut self,
        kind: EventKind,
    ) -> RuntimeResult<Guid> {
        self.domain.create_event(kind)
    }

    pub fn destroy_event(
        &mut self,
        event: Guid,
    ) -> RuntimeResult<()> {
        self.domain.destroy_event(event)
    }

    pub fn satisfy(
        &mut self,
        event: Guid,
        data: Guid,
    ) -> RuntimeResult<()> {
        self.domain.satisfy(self.ctx, event, data)
    }

    pub fn satisfy_slot(
        &mut self,
        event: Guid,
        data: Guid,
        slot: u32,
    ) -> RuntimeResult<()> {
        self.domain.satisfy_slot(self.ctx, event, data, slot)
    }

    pub fn add_dependence(
        &mut self,
        source: Guid,
        destination: Guid,
        slot: u32,
    ) -> RuntimeResult<()> {
        self.domain.add_dependence(self.ctx, source, destination, slot)
    }

    /// Create a task from inside this one. It joins the current finish
    /// scope, if any.
    pub fn spawn(
        &mut self,
        spec: TaskSpec,
    ) -> RuntimeResult<TaskHandles> {
        self.domain.create_task(self.ctx, spec)
    }

    pub fn create_datablock(
        &mut self,
        size: usize,
    ) -> RuntimeResult<Guid> {
        self.domain.create_datablock(size)
    }

    pub fn destroy_datablock(
        &mut self,
        block: Guid,
    ) -> RuntimeResult<()> {
        self.domain.destroy_datablock(self.ctx, block)
    }

    /// Ask every worker to stop once its current task is done.
    pub fn shutdown(&self) {
        self.domain.shutdown();
    }
}
