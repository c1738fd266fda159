//! Policy domain
//!
//! The policy domain owns every runtime resource (handle table, waiter pool,
//! scheduler, allocator) and implements the core operations on top of them.
//! Operations are available as direct methods and as [`PolicyMsg`]s handed
//! to [`PolicyDomain::process_message`].
//!
//! Every operation that can make a task ready takes the caller's
//! [`WorkerContext`]: ready tasks land on the caller's own workpile.

mod call;
pub mod message;

pub use call::{Dependency, TaskCall};
pub use message::{MsgHeader, MsgKind, MsgPayload, MsgStatus, PolicyMsg};

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};

use super::datablock::{BlockRelease, DataBlock, DataBlockError};
use super::error::{RuntimeError, RuntimeResult};
use super::event::{
    Event, EventKind, FinishLatch, Notify, Registration, Satisfaction, ScopeExit, WaiterPool,
    WaiterRef, LATCH_DECR_SLOT, LATCH_INCR_SLOT,
};
use super::guid::{Guid, GuidKind, GuidProvider, RuntimeObject, SlabGuidProvider};
use super::memory::{Allocator, SystemAllocator};
use super::scheduler::{Scheduler, SchedulerSnapshot};
use super::task::{Dependence, DependenceHost, Task, TaskHandles, TaskSpec, TaskTemplate};
use super::worker::WorkerContext;
use crate::util::config::RuntimeConfig;


/// Owner of all runtime state.
pub struct PolicyDomain {
    config: RuntimeConfig,
    guids: Box<dyn GuidProvider>,
    waiters: WaiterPool,
    scheduler: Scheduler,
    allocator: Box<dyn Allocator>,
    /// Tasks whose next frontier registration ran out of waiter nodes.
    stalled: Mutex<Vec<Guid>>,
    shutdown: AtomicBool,
}

impl PolicyDomain {
    /// Build a domain with the stock handle table and allocator.
    ///
    /// Returns one context per worker, indexed by worker id.
    pub fn new(config: &RuntimeConfig) -> RuntimeResult<(Self, Vec<WorkerContext>)> {
        let guids = Box::new(SlabGuidProvider::with_capacity(config.guid_capacity));
        let allocator: Box<dyn Allocator> = match config.memory_budget {
            Some(budget) => Box::new(SystemAllocator::with_budget(budget)),
            None => Box::new(SystemAllocator::new()),
        };
        Self::with_parts(config, guids, allocator)
    }

    /// Build a domain around a custom handle table and allocator.
    pub fn with_parts(
        config: &RuntimeConfig,
        guids: Box<dyn GuidProvider>,
        allocator: Box<dyn Allocator>,
    ) -> RuntimeResult<(Self, Vec<WorkerContext>)> {
        if config.workers == 0 {
            return Err(RuntimeError::InvalidArgument("at least one worker is required".into()));
        }
        let (scheduler, workpiles) = Scheduler::new(config.workers);
        let contexts = workpiles
            .into_iter()
            .enumerate()
            .map(|(id, workpile)| WorkerContext::new(id, workpile))
            .collect();

        debug!(
            "policy domain: {} workers, {} waiter nodes, {:?}",
            config.workers, config.waiter_pool_capacity, guids
        );
        let domain = Self {
            config: config.clone(),
            guids,
            waiters: WaiterPool::with_capacity(config.waiter_pool_capacity),
            scheduler,
            allocator,
            stalled: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        };
        Ok((domain, contexts))
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[inline]
    pub fn waiter_pool(&self) -> &WaiterPool {
        &self.waiters
    }

    #[inline]
    pub fn allocator(&self) -> &dyn Allocator {
        self.allocator.as_ref()
    }

    /// Handles currently alive.
    pub fn live_handles(&self) -> usize {
        self.guids.live()
    }

    pub fn stats(&self) -> SchedulerSnapshot {
        self.scheduler.snapshot()
    }

    // ---------------------------------------------------------------
    // Handles
    // ---------------------------------------------------------------

    fn publish(
        &self,
        build: impl FnOnce(Guid) -> RuntimeResult<RuntimeObject>,
    ) -> RuntimeResult<Guid> {
        let guid = self.guids.reserve()?;
        match build(guid) {
            Ok(object) => {
                self.guids.install(guid, object);
                Ok(guid)
            }
            Err(e) => {
                self.guids.release(guid);
                Err(e)
            }
        }
    }

    /// Resolve a handle to its object.
    pub fn resolve(
        &self,
        guid: Guid,
    ) -> RuntimeResult<RuntimeObject> {
        self.guids
            .resolve(guid)
            .ok_or(RuntimeError::StaleHandle(guid))
    }

    fn wrong_kind(
        guid: Guid,
        expected: GuidKind,
        found: &RuntimeObject,
    ) -> RuntimeError {
        RuntimeError::WrongKind {
            guid,
            expected,
            found: found.kind(),
        }
    }

    pub fn event(
        &self,
        guid: Guid,
    ) -> RuntimeResult<Arc<Event>> {
        match self.resolve(guid)? {
            RuntimeObject::Event(event) => Ok(event),
            other => Err(Self::wrong_kind(guid, GuidKind::Event, &other)),
        }
    }

    pub fn task(
        &self,
        guid: Guid,
    ) -> RuntimeResult<Arc<Task>> {
        match self.resolve(guid)? {
            RuntimeObject::Task(task) => Ok(task),
            other => Err(Self::wrong_kind(guid, GuidKind::Task, &other)),
        }
    }

    pub fn template(
        &self,
        guid: Guid,
    ) -> RuntimeResult<Arc<TaskTemplate>> {
        match self.resolve(guid)? {
            RuntimeObject::Template(template) => Ok(template),
            other => Err(Self::wrong_kind(guid, GuidKind::Template, &other)),
        }
    }

    pub fn datablock(
        &self,
        guid: Guid,
    ) -> RuntimeResult<Arc<DataBlock>> {
        match self.resolve(guid)? {
            RuntimeObject::DataBlock(block) => Ok(block),
            other => Err(Self::wrong_kind(guid, GuidKind::DataBlock, &other)),
        }
    }

    // ---------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------

    /// Create a `Once`, `Idem`, `Sticky` or `Latch` event.
    pub fn create_event(
        &self,
        kind: EventKind,
    ) -> RuntimeResult<Guid> {
        let guid = self.publish(|guid| Ok(RuntimeObject::Event(Arc::new(Event::new(guid, kind)?))))?;
        debug!("created {} event {}", kind, guid);
        Ok(guid)
    }

    /// Destroy an event. Waiters still queued on it never get signaled.
    pub fn destroy_event(
        &self,
        guid: Guid,
    ) -> RuntimeResult<()> {
        let event = self.event(guid)?;
        if event.kind() == EventKind::FinishLatch {
            return Err(RuntimeError::InvalidArgument(format!(
                "finish latch {} is owned by its scope",
                guid
            )));
        }
        event.discard(&self.waiters);
        self.guids.release(guid);
        debug!("destroyed event {}", guid);
        Ok(())
    }

    /// Payload of a satisfied event, `None` while unsatisfied.
    pub fn event_value(
        &self,
        guid: Guid,
    ) -> RuntimeResult<Option<Guid>> {
        Ok(self.event(guid)?.value())
    }

    fn free_event(
        &self,
        guid: Guid,
    ) {
        if self.guids.release(guid).is_some() {
            trace!("freed event {}", guid);
        }
    }

    /// Satisfy a single event (slot 0).
    pub fn satisfy(
        &self,
        ctx: &mut WorkerContext,
        event: Guid,
        data: Guid,
    ) -> RuntimeResult<()> {
        self.satisfy_slot(ctx, event, data, 0)
    }

    /// Satisfy `event` on `slot`. For latches slot 0 decrements and slot 1
    /// increments.
    pub fn satisfy_slot(
        &self,
        ctx: &mut WorkerContext,
        event: Guid,
        data: Guid,
        slot: u32,
    ) -> RuntimeResult<()> {
        let mut pending = Deliveries::new();
        self.satisfy_step(ctx, &mut pending, event, data, slot)?;
        self.run_deliveries(ctx, pending)
    }

    /// Carry out queued deliveries until none are left.
    ///
    /// Event-to-event links and scope exits are queued here instead of being
    /// followed recursively. The first failure is returned once the queue is
    /// empty.
    fn run_deliveries(
        &self,
        ctx: &mut WorkerContext,
        mut pending: Deliveries,
    ) -> RuntimeResult<()> {
        let mut first_error = None;
        while let Some(delivery) = pending.pop_front() {
            let step = match delivery {
                Delivery::Satisfy { event, data, slot } => {
                    self.satisfy_step(ctx, &mut pending, event, data, slot)
                }
                Delivery::Signal { waiter, data } => {
                    self.signal_step(ctx, &mut pending, waiter, data)
                }
            };
            if let Err(e) = step {
                warn!("delivery on worker {} failed: {}", ctx.id(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn satisfy_step(
        &self,
        ctx: &mut WorkerContext,
        pending: &mut Deliveries,
        event: Guid,
        data: Guid,
        slot: u32,
    ) -> RuntimeResult<()> {
        let target = self.event(event)?;
        let outcome = {
            let mut dispatch = Dispatch::new(self, ctx, pending);
            target.satisfy(&self.waiters, data, slot, &mut dispatch)?
        };
        match outcome {
            Satisfaction::Fired { drained: true, .. } => self.free_event(event),
            Satisfaction::ScopeClosed(exit) => self.close_scope(pending, event, exit),
            _ => {}
        }
        Ok(())
    }

    /// Clear the owner's marker, queue the output delivery and the parent
    /// check-out, then free the latch.
    fn close_scope(
        &self,
        pending: &mut Deliveries,
        latch: Guid,
        exit: ScopeExit,
    ) {
        if let Ok(owner) = self.task(exit.owner) {
            owner.clear_scope(latch);
        }
        if let Some(output) = exit.output {
            pending.push_back(Delivery::Signal {
                waiter: output,
                data: exit.value,
            });
        }
        if let Some(parent) = exit.parent {
            pending.push_back(Delivery::Satisfy {
                event: parent,
                data: Guid::NULL,
                slot: LATCH_DECR_SLOT,
            });
        }
        self.free_event(latch);
    }

    /// Make `destination` depend on `source`.
    ///
    /// `source` may be null, a data block or an event; `destination` must be
    /// an event. Task dependences are fixed when the task is created.
    pub fn add_dependence(
        &self,
        ctx: &mut WorkerContext,
        source: Guid,
        destination: Guid,
        slot: u32,
    ) -> RuntimeResult<()> {
        let target = self.event(destination)?;
        if target.kind() == EventKind::FinishLatch {
            return Err(RuntimeError::InvalidArgument(format!(
                "finish latch {} is driven by its scope only",
                destination
            )));
        }
        if slot >= target.kind().slot_count() {
            return Err(RuntimeError::InvalidArgument(format!(
                "slot {} out of range for {} event {}",
                slot,
                target.kind(),
                destination
            )));
        }
        if source.is_null() {
            return self.satisfy_slot(ctx, destination, Guid::NULL, slot);
        }
        match self.resolve(source)? {
            RuntimeObject::DataBlock(_) => self.satisfy_slot(ctx, destination, source, slot),
            RuntimeObject::Event(_) => {
                match self.register_on(source, WaiterRef::new(destination, slot))? {
                    Registration::Queued => Ok(()),
                    Registration::Resolved(data) => self.satisfy_slot(ctx, destination, data, slot),
                }
            }
            other => Err(Self::wrong_kind(source, GuidKind::Event, &other)),
        }
    }

    fn register_on(
        &self,
        signaler: Guid,
        waiter: WaiterRef,
    ) -> RuntimeResult<Registration> {
        let event = self.event(signaler)?;
        let registered = event.register_waiter(&self.waiters, waiter)?;
        if registered.drained {
            self.free_event(signaler);
        }
        Ok(registered.registration)
    }

    /// Deliver `data` to a waiter: a task slot or an event slot.
    fn signal_step(
        &self,
        ctx: &mut WorkerContext,
        pending: &mut Deliveries,
        waiter: WaiterRef,
        data: Guid,
    ) -> RuntimeResult<()> {
        match self.resolve(waiter.waiter)? {
            RuntimeObject::Task(task) => {
                let delivered = {
                    let mut dispatch = Dispatch::new(self, ctx, pending);
                    task.on_satisfy(&mut dispatch, data, waiter.slot)
                };
                if let Err(RuntimeError::ResourceExhausted { .. }) = &delivered {
                    self.stall(task.guid());
                }
                delivered
            }
            RuntimeObject::Event(_) => {
                self.satisfy_step(ctx, pending, waiter.waiter, data, waiter.slot)
            }
            other => Err(Self::wrong_kind(waiter.waiter, GuidKind::Task, &other)),
        }
    }

    fn stall(
        &self,
        task: Guid,
    ) {
        warn!("task {} could not register on its next dependence", task);
        self.stalled.lock().push(task);
    }

    /// Tasks waiting for a waiter node to register on their frontier.
    pub fn stalled_tasks(&self) -> usize {
        self.stalled.lock().len()
    }

    /// Retry the frontier registrations that ran out of waiter nodes.
    ///
    /// Returns how many tasks are still stalled.
    pub fn resume_stalled(
        &self,
        ctx: &mut WorkerContext,
    ) -> RuntimeResult<usize> {
        let stalled = std::mem::take(&mut *self.stalled.lock());
        if stalled.is_empty() {
            return Ok(0);
        }
        let mut pending = Deliveries::new();
        let mut result = Ok(());
        for guid in stalled {
            let Ok(task) = self.task(guid) else {
                continue;
            };
            let resumed = {
                let mut dispatch = Dispatch::new(self, ctx, &mut pending);
                task.resume(&mut dispatch)
            };
            match resumed {
                Ok(()) => trace!("task {} resumed", guid),
                Err(RuntimeError::ResourceExhausted { .. }) => self.stalled.lock().push(guid),
                Err(e) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result?;
        Ok(self.stalled_tasks())
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    pub fn create_template(
        &self,
        template: TaskTemplate,
    ) -> RuntimeResult<Guid> {
        let name = template.name().to_string();
        let guid = self.publish(|_| Ok(RuntimeObject::Template(Arc::new(template))))?;
        debug!("created template '{}' as {}", name, guid);
        Ok(guid)
    }

    /// Tasks already created from the template keep it alive.
    pub fn destroy_template(
        &self,
        guid: Guid,
    ) -> RuntimeResult<()> {
        self.template(guid)?;
        self.guids.release(guid);
        Ok(())
    }

    fn classify(
        &self,
        dep: Guid,
    ) -> RuntimeResult<Dependence> {
        if dep.is_null() {
            return Ok(Dependence::Resolved(Guid::NULL));
        }
        match self.resolve(dep)? {
            RuntimeObject::DataBlock(_) => Ok(Dependence::Resolved(dep)),
            RuntimeObject::Event(event) if event.kind() == EventKind::FinishLatch => {
                Err(RuntimeError::InvalidArgument(format!(
                    "finish latch {} cannot be a dependence",
                    dep
                )))
            }
            RuntimeObject::Event(_) => Ok(Dependence::Pending(dep)),
            other => Err(Self::wrong_kind(dep, GuidKind::Event, &other)),
        }
    }

    /// Create a task.
    ///
    /// A task created while another task runs on `ctx` joins that task's
    /// finish scope. A finish task opens a nested scope of its own.
    pub fn create_task(
        &self,
        ctx: &mut WorkerContext,
        spec: TaskSpec,
    ) -> RuntimeResult<TaskHandles> {
        if self.is_shutting_down() {
            return Err(RuntimeError::ShuttingDown);
        }
        let template = self.template(spec.template)?;
        if spec.params.len() != template.paramc() {
            return Err(RuntimeError::InvalidArgument(format!(
                "template '{}' takes {} parameters, got {}",
                template.name(),
                template.paramc(),
                spec.params.len()
            )));
        }
        if spec.deps.len() != template.depc() {
            return Err(RuntimeError::InvalidArgument(format!(
                "template '{}' takes {} dependences, got {}",
                template.name(),
                template.depc(),
                spec.deps.len()
            )));
        }
        let deps = spec
            .deps
            .iter()
            .map(|&dep| self.classify(dep))
            .collect::<RuntimeResult<SmallVec<[Dependence; 8]>>>()?;

        let output = if spec.output_event {
            Some(self.create_event(EventKind::Sticky)?)
        } else {
            None
        };
        let enclosing = ctx
            .current_task()
            .and_then(|current| self.task(current).ok())
            .and_then(|current| current.scope());

        let guid = match self.guids.reserve() {
            Ok(guid) => guid,
            Err(e) => {
                if let Some(output) = output {
                    self.free_event(output);
                }
                return Err(e);
            }
        };
        let task = Arc::new(Task::new(
            guid,
            template,
            spec.params,
            &deps,
            spec.props,
            output,
        ));

        if spec.props.finish {
            let state = FinishLatch::new(guid, output.map(|o| WaiterRef::new(o, 0)), enclosing);
            let published = self.publish(|latch| {
                Ok(RuntimeObject::Event(Arc::new(Event::finish_latch(latch, state))))
            });
            let latch = match published {
                Ok(latch) => latch,
                Err(e) => {
                    self.guids.release(guid);
                    if let Some(output) = output {
                        self.free_event(output);
                    }
                    return Err(e);
                }
            };
            if let Some(parent) = enclosing {
                self.satisfy_slot(ctx, parent, Guid::NULL, LATCH_INCR_SLOT)?;
            }
            self.satisfy_slot(ctx, latch, Guid::NULL, LATCH_INCR_SLOT)?;
            task.set_scope(latch);
            trace!("task {} opens finish scope {} (parent {:?})", guid, latch, enclosing);
        } else if let Some(scope) = enclosing {
            self.satisfy_slot(ctx, scope, Guid::NULL, LATCH_INCR_SLOT)?;
            task.set_scope(scope);
        }

        self.guids.install(guid, RuntimeObject::Task(task.clone()));
        trace!(
            "created task {} from '{}' ({} deps, satisfied {})",
            guid,
            task.template().name(),
            task.depc(),
            task.satisfied()
        );

        let mut pending = Deliveries::new();
        let started = {
            let mut dispatch = Dispatch::new(self, ctx, &mut pending);
            task.start(&mut dispatch)
        };
        if let Err(e) = started {
            warn!("task {} not started: {}", guid, e);
            self.abandon_task(ctx, &task)?;
            return Err(e);
        }
        Ok(TaskHandles { task: guid, output })
    }

    /// Undo a creation whose first registration failed. No waiter is queued
    /// on the task's behalf yet.
    fn abandon_task(
        &self,
        ctx: &mut WorkerContext,
        task: &Task,
    ) -> RuntimeResult<()> {
        self.guids.release(task.guid());
        let mut result = Ok(());
        if let Some(scope) = task.scope() {
            if task.props().finish {
                let parent = self
                    .event(scope)
                    .ok()
                    .and_then(|latch| latch.as_finish().and_then(FinishLatch::parent));
                self.free_event(scope);
                if let Some(parent) = parent {
                    result = self.satisfy_slot(ctx, parent, Guid::NULL, LATCH_DECR_SLOT);
                }
            } else {
                result = self.satisfy_slot(ctx, scope, Guid::NULL, LATCH_DECR_SLOT);
            }
        }
        if let Some(output) = task.output() {
            self.free_event(output);
        }
        debug!("abandoned task {}", task.guid());
        result
    }

    /// Run a ready task on the calling worker and signal its completion.
    pub fn execute_task(
        &self,
        ctx: &mut WorkerContext,
        guid: Guid,
    ) -> RuntimeResult<()> {
        let task = self.task(guid)?;
        task.begin_run();

        let deps = self.acquire_dependencies(&task)?;
        trace!("worker {} runs task {} ('{}')", ctx.id(), guid, task.template().name());
        let previous = ctx.enter(guid);
        let value = {
            let mut call = TaskCall::new(self, ctx, &task, &deps);
            task.template().invoke(&mut call)
        };
        ctx.leave(previous);
        self.release_dependencies(&task, &deps);

        task.complete();
        self.scheduler.stats().record_executed();

        let mut result = Ok(());
        if let Some(scope) = task.scope() {
            if task.props().finish {
                if let Some(latch) = self.event(scope)?.as_finish() {
                    latch.set_return_value(value);
                }
            }
            result = self.satisfy_slot(ctx, scope, Guid::NULL, LATCH_DECR_SLOT);
        }
        if !task.props().finish {
            if let Some(output) = task.output() {
                result = result.and(self.satisfy(ctx, output, value));
            }
        }

        self.guids.release(guid);
        trace!("task {} done, returned {}", guid, value);
        result
    }

    fn acquire_dependencies(
        &self,
        task: &Task,
    ) -> RuntimeResult<SmallVec<[Dependency; 8]>> {
        let mut deps: SmallVec<[Dependency; 8]> = SmallVec::with_capacity(task.depc());
        for payload in task.payloads() {
            let guid = payload.unwrap_or(Guid::NULL);
            let block = match self.guids.resolve(guid) {
                Some(RuntimeObject::DataBlock(block)) => {
                    if let Err(e) = block.acquire(task.guid()) {
                        self.release_dependencies(task, &deps);
                        return Err(e.into());
                    }
                    Some(block)
                }
                _ => None,
            };
            deps.push(Dependency { guid, block });
        }
        Ok(deps)
    }

    fn release_dependencies(
        &self,
        task: &Task,
        deps: &[Dependency],
    ) {
        for block in deps.iter().filter_map(|d| d.block.as_ref()) {
            match block.release(task.guid()) {
                Ok(BlockRelease::Destroy) => self.destroy_block(block),
                Ok(BlockRelease::Retained) => {}
                // Freed by the task itself, or listed twice.
                Err(DataBlockError::NotAcquired { .. }) => {}
                Err(e) => warn!("task {}: {}", task.guid(), e),
            }
        }
    }

    // ---------------------------------------------------------------
    // Data blocks
    // ---------------------------------------------------------------

    pub fn create_datablock(
        &self,
        size: usize,
    ) -> RuntimeResult<Guid> {
        let buffer = self.allocator.allocate(size)?;
        let mut buffer = Some(buffer);
        let result = self.publish(|guid| {
            let buffer = buffer.take().unwrap_or_default();
            Ok(RuntimeObject::DataBlock(Arc::new(DataBlock::new(guid, buffer))))
        });
        if let Some(buffer) = buffer {
            // Handle table exhausted before the block was built.
            self.allocator.release(buffer);
        }
        let guid = result?;
        debug!("created data block {} ({} bytes)", guid, size);
        Ok(guid)
    }

    /// Request that a data block be freed. Destruction waits for every task
    /// holding it to release it; the calling task's own hold is dropped.
    pub fn destroy_datablock(
        &self,
        ctx: &mut WorkerContext,
        guid: Guid,
    ) -> RuntimeResult<()> {
        let block = self.datablock(guid)?;
        if block.request_free(ctx.current_task())? == BlockRelease::Destroy {
            self.destroy_block(&block);
        }
        Ok(())
    }

    fn destroy_block(
        &self,
        block: &DataBlock,
    ) {
        if let Some(buffer) = block.take_buffer() {
            self.allocator.release(buffer);
        }
        self.guids.release(block.guid());
        debug!("destroyed data block {}", block.guid());
    }

    // ---------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------

    #[inline]
    pub fn take(
        &self,
        ctx: &WorkerContext,
    ) -> Option<Guid> {
        self.scheduler.take(ctx)
    }

    #[inline]
    pub fn give(
        &self,
        ctx: &WorkerContext,
        tasks: &[Guid],
    ) {
        self.scheduler.give(ctx, tasks)
    }

    /// Ask workers to stop after their current task.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("shutdown requested");
        }
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------

    /// Carry out a message and write its results back into it.
    pub fn process_message(
        &self,
        ctx: &mut WorkerContext,
        msg: &mut PolicyMsg,
    ) -> RuntimeResult<()> {
        msg.header.source = ctx.id();
        msg.header.kind = msg.payload.kind();
        let result = self.dispatch_message(ctx, &mut msg.payload);
        msg.header.status = match &result {
            Ok(()) => MsgStatus::Done,
            Err(e) => MsgStatus::Failed(e.to_string()),
        };
        trace!("worker {} processed {:?}: {:?}", ctx.id(), msg.header.kind, msg.header.status);
        result
    }

    fn dispatch_message(
        &self,
        ctx: &mut WorkerContext,
        payload: &mut MsgPayload,
    ) -> RuntimeResult<()> {
        match payload {
            MsgPayload::CreateEvent { kind, guid } => {
                *guid = self.create_event(*kind)?;
            }
            MsgPayload::DestroyEvent { guid } => self.destroy_event(*guid)?,
            MsgPayload::Satisfy {
                target,
                slot,
                payload,
            } => self.satisfy_slot(ctx, *target, *payload, *slot)?,
            MsgPayload::AddDependence {
                source,
                destination,
                slot,
            } => self.add_dependence(ctx, *source, *destination, *slot)?,
            MsgPayload::CreateTask {
                template,
                params,
                deps,
                props,
                output_event,
                guid,
                output,
            } => {
                let spec = TaskSpec {
                    template: *template,
                    params: params.clone(),
                    deps: deps.clone(),
                    props: *props,
                    output_event: *output_event,
                };
                let handles = self.create_task(ctx, spec)?;
                *guid = handles.task;
                *output = handles.output;
            }
            MsgPayload::CreateDataBlock { size, guid } => {
                *guid = self.create_datablock(*size)?;
            }
            MsgPayload::DestroyDataBlock { guid } => self.destroy_datablock(ctx, *guid)?,
            MsgPayload::Take { count, tasks } => {
                tasks.clear();
                while tasks.len() < *count {
                    match self.take(ctx) {
                        Some(task) => tasks.push(task),
                        None => break,
                    }
                }
            }
            MsgPayload::Give { tasks } => self.give(ctx, tasks),
            MsgPayload::Shutdown => self.shutdown(),
        }
        Ok(())
    }
}

impl fmt::Debug for PolicyDomain {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PolicyDomain")
            .field("workers", &self.scheduler.num_workers())
            .field("guids", &self.guids)
            .field("waiters", &self.waiters)
            .field("allocator", &self.allocator)
            .field("shutdown", &self.is_shutting_down())
            .finish()
    }
}

/// A delivery queued by [`PolicyDomain::run_deliveries`].
#[derive(Debug, Clone, Copy)]
enum Delivery {
    /// Satisfy `event` on `slot`.
    Satisfy { event: Guid, data: Guid, slot: u32 },
    /// Hand `data` to a task or event waiter.
    Signal { waiter: WaiterRef, data: Guid },
}

type Deliveries = VecDeque<Delivery>;

/// Routes deliveries and frontier callbacks back into the domain on behalf
/// of one worker.
struct Dispatch<'a> {
    domain: &'a PolicyDomain,
    ctx: &'a mut WorkerContext,
    pending: &'a mut Deliveries,
}

impl<'a> Dispatch<'a> {
    fn new(
        domain: &'a PolicyDomain,
        ctx: &'a mut WorkerContext,
        pending: &'a mut Deliveries,
    ) -> Self {
        Self {
            domain,
            ctx,
            pending,
        }
    }
}

impl Notify for Dispatch<'_> {
    fn signal(
        &mut self,
        waiter: WaiterRef,
        data: Guid,
    ) {
        self.pending.push_back(Delivery::Signal { waiter, data });
    }
}

impl DependenceHost for Dispatch<'_> {
    fn register(
        &mut self,
        signaler: Guid,
        waiter: WaiterRef,
    ) -> RuntimeResult<Registration> {
        self.domain.register_on(signaler, waiter)
    }

    fn ready(
        &mut self,
        task: Guid,
    ) {
        self.domain.scheduler.give(self.ctx, &[task]);
    }
}
