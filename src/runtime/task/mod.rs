//! Tasks and their dependency frontier
//!
//! A task holds a fixed parameter block and one slot per dependency. Null and
//! data-block dependencies are resolved at creation. Event dependencies are
//! registered lazily: the task only ever waits on its *frontier*, the lowest
//! unresolved slot, and moves to the next one when that slot is signaled.
//! When every slot is resolved the task becomes ready and is handed to the
//! scheduler.

mod template;

pub use template::{TaskFn, TaskTemplate};

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::error::RuntimeResult;
use super::event::{Registration, WaiterRef};
use super::guid::Guid;

#[cfg(test)]
mod tests;

/// Task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting on dependencies.
    Created,
    /// Every dependency resolved; sitting in a workpile.
    Ready,
    /// Handed to a worker.
    Running,
    /// User function returned.
    Completed,
}

impl TaskState {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => TaskState::Created,
            1 => TaskState::Ready,
            2 => TaskState::Running,
            _ => TaskState::Completed,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            TaskState::Created => 0,
            TaskState::Ready => 1,
            TaskState::Running => 2,
            TaskState::Completed => 3,
        }
    }
}

/// Creation properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProps {
    /// The task opens a finish scope: its output event fires only once every
    /// task transitively created inside it has completed.
    pub finish: bool,
}

impl TaskProps {
    pub const FINISH: TaskProps = TaskProps { finish: true };
}

/// Everything needed to create a task.
///
/// ```ignore
/// let spec = TaskSpec::new(template).params([3]).deps([event]).with_output();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub template: Guid,
    pub params: Vec<u64>,
    pub deps: Vec<Guid>,
    pub props: TaskProps,
    /// Create a sticky output event satisfied with the task's result.
    pub output_event: bool,
}

impl TaskSpec {
    pub fn new(template: Guid) -> Self {
        Self {
            template,
            params: Vec::new(),
            deps: Vec::new(),
            props: TaskProps::default(),
            output_event: false,
        }
    }

    pub fn params(
        mut self,
        params: impl Into<Vec<u64>>,
    ) -> Self {
        self.params = params.into();
        self
    }

    pub fn deps(
        mut self,
        deps: impl Into<Vec<Guid>>,
    ) -> Self {
        self.deps = deps.into();
        self
    }

    /// Open a finish scope.
    pub fn finish(mut self) -> Self {
        self.props.finish = true;
        self
    }

    pub fn with_output(mut self) -> Self {
        self.output_event = true;
        self
    }
}

/// Handles produced by task creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandles {
    pub task: Guid,
    pub output: Option<Guid>,
}

/// A dependency as classified at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependence {
    /// Known payload (null or a data block).
    Resolved(Guid),
    /// Event that will deliver the payload.
    Pending(Guid),
}

/// Callbacks a task needs while resolving its frontier.
pub trait DependenceHost {
    /// Register `waiter` on the event `signaler`.
    fn register(
        &mut self,
        signaler: Guid,
        waiter: WaiterRef,
    ) -> RuntimeResult<Registration>;

    /// The task became ready.
    fn ready(
        &mut self,
        task: Guid,
    );
}

struct DepSlot {
    signaler: Guid,
    payload: AtomicU64,
}

pub struct Task {
    guid: Guid,
    template: Arc<TaskTemplate>,
    params: Box<[u64]>,
    slots: Box<[DepSlot]>,
    frontier: AtomicUsize,
    satisfied: AtomicUsize,
    state: AtomicU8,
    props: TaskProps,
    output: Option<Guid>,
    /// Finish latch of the scope the task runs in, or null.
    scope: AtomicU64,
}

impl Task {
    pub(crate) fn new(
        guid: Guid,
        template: Arc<TaskTemplate>,
        params: Vec<u64>,
        deps: &[Dependence],
        props: TaskProps,
        output: Option<Guid>,
    ) -> Self {
        let slots: Box<[DepSlot]> = deps
            .iter()
            .map(|dep| match *dep {
                Dependence::Resolved(payload) => DepSlot {
                    signaler: payload,
                    payload: AtomicU64::new(payload.raw()),
                },
                Dependence::Pending(event) => DepSlot {
                    signaler: event,
                    payload: AtomicU64::new(Guid::UNSET_RAW),
                },
            })
            .collect();
        let satisfied = deps
            .iter()
            .filter(|d| matches!(d, Dependence::Resolved(_)))
            .count();
        let frontier = deps
            .iter()
            .position(|d| matches!(d, Dependence::Pending(_)))
            .unwrap_or(deps.len());

        Self {
            guid,
            template,
            params: params.into_boxed_slice(),
            slots,
            frontier: AtomicUsize::new(frontier),
            satisfied: AtomicUsize::new(satisfied),
            state: AtomicU8::new(TaskState::Created.as_u8()),
            props,
            output,
            scope: AtomicU64::new(Guid::NULL.raw()),
        }
    }

    #[inline]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[inline]
    pub fn template(&self) -> &Arc<TaskTemplate> {
        &self.template
    }

    #[inline]
    pub fn params(&self) -> &[u64] {
        &self.params
    }

    #[inline]
    pub fn depc(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn props(&self) -> TaskProps {
        self.props
    }

    /// Event satisfied with the return value when the task completes.
    #[inline]
    pub fn output(&self) -> Option<Guid> {
        self.output
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn frontier(&self) -> usize {
        self.frontier.load(Ordering::Acquire)
    }

    #[inline]
    pub fn satisfied(&self) -> usize {
        self.satisfied.load(Ordering::Acquire)
    }

    /// Active finish scope, if any.
    pub fn scope(&self) -> Option<Guid> {
        let raw = self.scope.load(Ordering::Acquire);
        (raw != Guid::NULL.raw()).then(|| Guid::from_raw(raw))
    }

    pub(crate) fn set_scope(
        &self,
        latch: Guid,
    ) {
        self.scope.store(latch.raw(), Ordering::Release);
    }

    /// Drop the scope marker if it still points at `latch`.
    pub(crate) fn clear_scope(
        &self,
        latch: Guid,
    ) -> bool {
        self.scope
            .compare_exchange(
                latch.raw(),
                Guid::NULL.raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Payload of each slot. Unresolved slots read as `None`.
    pub fn payloads(&self) -> Vec<Option<Guid>> {
        self.slots
            .iter()
            .map(|s| match s.payload.load(Ordering::Acquire) {
                Guid::UNSET_RAW => None,
                raw => Some(Guid::from_raw(raw)),
            })
            .collect()
    }

    /// Register on the first pending dependency, or become ready right away
    /// when there is none.
    pub fn start(
        &self,
        host: &mut dyn DependenceHost,
    ) -> RuntimeResult<()> {
        let frontier = self.frontier.load(Ordering::Acquire);
        if frontier >= self.slots.len() {
            self.mark_ready();
            host.ready(self.guid);
            return Ok(());
        }
        self.wait_from(host, frontier)
    }

    /// Register on the frontier again after a registration failed.
    ///
    /// The frontier slot is unresolved and nothing is queued for it, so no
    /// delivery can race with this call.
    pub(crate) fn resume(
        &self,
        host: &mut dyn DependenceHost,
    ) -> RuntimeResult<()> {
        let frontier = self.frontier.load(Ordering::Acquire);
        if self.state() != TaskState::Created || frontier >= self.slots.len() {
            return Ok(());
        }
        self.wait_from(host, frontier)
    }

    /// Deliver `data` to `slot`.
    ///
    /// Registrations that find their event already fired are resolved in
    /// the same loop.
    pub fn on_satisfy(
        &self,
        host: &mut dyn DependenceHost,
        data: Guid,
        slot: u32,
    ) -> RuntimeResult<()> {
        match self.resolve_slot(host, slot as usize, data) {
            Some(next) => self.wait_from(host, next),
            None => Ok(()),
        }
    }

    fn wait_from(
        &self,
        host: &mut dyn DependenceHost,
        mut slot: usize,
    ) -> RuntimeResult<()> {
        loop {
            let signaler = self.slots[slot].signaler;
            match host.register(signaler, WaiterRef::new(self.guid, slot as u32))? {
                Registration::Queued => return Ok(()),
                Registration::Resolved(data) => match self.resolve_slot(host, slot, data) {
                    Some(next) => slot = next,
                    None => return Ok(()),
                },
            }
        }
    }

    /// Record `data` on `slot`. Returns the slot to register on next.
    fn resolve_slot(
        &self,
        host: &mut dyn DependenceHost,
        slot: usize,
        data: Guid,
    ) -> Option<usize> {
        let depc = self.slots.len();
        if slot >= depc {
            crate::fatal!("slot {} out of range for task {} (depc {})", slot, self.guid, depc);
        }
        if self.slots[slot]
            .payload
            .compare_exchange(
                Guid::UNSET_RAW,
                data.raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            crate::fatal!("slot {} of task {} satisfied twice", slot, self.guid);
        }

        let next = if slot == self.frontier.load(Ordering::Acquire) {
            let next = self.next_unresolved(slot + 1);
            self.frontier.store(next, Ordering::Release);
            Some(next)
        } else {
            None
        };

        let satisfied = self.satisfied.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("task {} slot {} <- {} ({}/{})", self.guid, slot, data, satisfied, depc);
        if satisfied == depc {
            self.mark_ready();
            host.ready(self.guid);
            return None;
        }
        next.filter(|&n| n < depc)
    }

    fn next_unresolved(
        &self,
        from: usize,
    ) -> usize {
        (from..self.slots.len())
            .find(|&i| self.slots[i].payload.load(Ordering::Acquire) == Guid::UNSET_RAW)
            .unwrap_or(self.slots.len())
    }

    fn mark_ready(&self) {
        self.transition(TaskState::Created, TaskState::Ready);
        trace!("task {} ready", self.guid);
    }

    /// Claim the task for execution.
    pub(crate) fn begin_run(&self) {
        let satisfied = self.satisfied.load(Ordering::Acquire);
        if satisfied != self.slots.len() {
            crate::fatal!(
                "task {} executed with {}/{} dependencies satisfied",
                self.guid,
                satisfied,
                self.slots.len()
            );
        }
        self.transition(TaskState::Ready, TaskState::Running);
    }

    pub(crate) fn complete(&self) {
        self.transition(TaskState::Running, TaskState::Completed);
    }

    fn transition(
        &self,
        from: TaskState,
        to: TaskState,
    ) {
        if let Err(actual) = self.state.compare_exchange(
            from.as_u8(),
            to.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            crate::fatal!(
                "task {} cannot go {:?} -> {:?}, it is {:?}",
                self.guid,
                from,
                to,
                TaskState::from_u8(actual)
            );
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Task")
            .field("guid", &self.guid)
            .field("template", &self.template.name())
            .field("state", &self.state())
            .field("frontier", &self.frontier())
            .field("satisfied", &self.satisfied())
            .field("depc", &self.depc())
            .finish()
    }
}
