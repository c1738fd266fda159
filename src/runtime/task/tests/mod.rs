//! Task 单元测试
//!
//! 测试任务状态、依赖前沿推进与就绪转换

use std::collections::HashMap;
use std::sync::Arc;

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::event::{Registration, WaiterRef};
use crate::runtime::guid::Guid;
use crate::runtime::task::{Dependence, DependenceHost, Task, TaskProps, TaskState, TaskTemplate};

fn g(n: u32) -> Guid {
    Guid::from_parts(n, 1)
}

/// Minimal event model: signalers either fired with a payload or hold one
/// queued waiter.
#[derive(Default)]
struct FakeHost {
    fired: HashMap<Guid, Guid>,
    queued: HashMap<Guid, WaiterRef>,
    registrations: Vec<Guid>,
    ready: Vec<Guid>,
    /// Registrations to refuse as if the waiter pool were empty.
    refuse: usize,
}

impl FakeHost {
    /// Fire `event`; returns the waiter that must be signaled, if any.
    fn fire(
        &mut self,
        event: Guid,
        data: Guid,
    ) -> Option<WaiterRef> {
        self.fired.insert(event, data);
        self.queued.remove(&event)
    }
}

impl DependenceHost for FakeHost {
    fn register(
        &mut self,
        signaler: Guid,
        waiter: WaiterRef,
    ) -> RuntimeResult<Registration> {
        if self.refuse > 0 {
            self.refuse -= 1;
            return Err(RuntimeError::ResourceExhausted {
                resource: "waiter pool",
                capacity: 0,
            });
        }
        self.registrations.push(signaler);
        match self.fired.get(&signaler) {
            Some(data) => Ok(Registration::Resolved(*data)),
            None => {
                self.queued.insert(signaler, waiter);
                Ok(Registration::Queued)
            }
        }
    }

    fn ready(
        &mut self,
        task: Guid,
    ) {
        self.ready.push(task);
    }
}

fn template(depc: usize) -> Arc<TaskTemplate> {
    Arc::new(TaskTemplate::new("t", 0, depc, |_| Guid::NULL))
}

fn task(deps: &[Dependence]) -> Task {
    Task::new(g(100), template(deps.len()), vec![], deps, TaskProps::default(), None)
}

fn fire(
    host: &mut FakeHost,
    task: &Task,
    event: Guid,
    data: Guid,
) {
    if let Some(w) = host.fire(event, data) {
        assert_eq!(w.waiter, task.guid());
        task.on_satisfy(host, data, w.slot).unwrap();
    }
}

#[cfg(test)]
mod task_state_tests {
    use super::*;

    #[test]
    fn test_task_state_u8_roundtrip() {
        for state in [
            TaskState::Created,
            TaskState::Ready,
            TaskState::Running,
            TaskState::Completed,
        ] {
            assert_eq!(TaskState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_task_props_default() {
        assert!(!TaskProps::default().finish);
        assert!(TaskProps::FINISH.finish);
    }
}

#[cfg(test)]
mod frontier_tests {
    use super::*;

    #[test]
    fn test_no_dependencies_ready_on_start() {
        let t = task(&[]);
        let mut host = FakeHost::default();
        t.start(&mut host).unwrap();
        assert_eq!(host.ready, vec![t.guid()]);
        assert_eq!(t.state(), TaskState::Ready);
    }

    #[test]
    fn test_preresolved_dependencies_count() {
        let t = task(&[Dependence::Resolved(Guid::NULL), Dependence::Resolved(g(5))]);
        assert_eq!(t.satisfied(), 2);
        let mut host = FakeHost::default();
        t.start(&mut host).unwrap();
        assert_eq!(host.ready.len(), 1);
        assert!(host.registrations.is_empty());
    }

    #[test]
    fn test_registers_only_on_frontier() {
        let t = task(&[
            Dependence::Pending(g(1)),
            Dependence::Pending(g(2)),
            Dependence::Pending(g(3)),
        ]);
        let mut host = FakeHost::default();
        t.start(&mut host).unwrap();
        assert_eq!(host.registrations, vec![g(1)]);
        assert_eq!(t.frontier(), 0);

        fire(&mut host, &t, g(1), g(11));
        assert_eq!(host.registrations, vec![g(1), g(2)]);
        assert_eq!(t.frontier(), 1);
        assert!(host.ready.is_empty());
    }

    #[test]
    fn test_frontier_skips_preresolved_slots() {
        let t = task(&[
            Dependence::Resolved(Guid::NULL),
            Dependence::Pending(g(1)),
            Dependence::Resolved(g(9)),
            Dependence::Pending(g(2)),
        ]);
        assert_eq!(t.frontier(), 1);
        let mut host = FakeHost::default();
        t.start(&mut host).unwrap();

        fire(&mut host, &t, g(1), g(11));
        assert_eq!(t.frontier(), 3);
        fire(&mut host, &t, g(2), g(12));
        assert_eq!(host.ready, vec![t.guid()]);
        assert_eq!(
            t.payloads(),
            vec![Some(Guid::NULL), Some(g(11)), Some(g(9)), Some(g(12))]
        );
    }

    #[test]
    fn test_fired_events_fold_into_one_pass() {
        let t = task(&[
            Dependence::Pending(g(1)),
            Dependence::Pending(g(2)),
            Dependence::Pending(g(3)),
        ]);
        let mut host = FakeHost::default();
        host.fire(g(1), g(11));
        host.fire(g(2), g(12));
        host.fire(g(3), g(13));

        t.start(&mut host).unwrap();
        assert_eq!(host.registrations, vec![g(1), g(2), g(3)]);
        assert_eq!(host.ready, vec![t.guid()]);
        assert_eq!(t.satisfied(), 3);
    }

    #[test]
    fn test_long_chain_of_fired_events_does_not_recurse() {
        let n = 50_000;
        let deps: Vec<_> = (0..n).map(|i| Dependence::Pending(g(i + 1))).collect();
        let t = task(&deps);
        let mut host = FakeHost::default();
        for i in 0..n {
            host.fire(g(i + 1), Guid::NULL);
        }
        t.start(&mut host).unwrap();
        assert_eq!(host.ready.len(), 1);
    }

    #[test]
    fn test_every_firing_order_readies_once() {
        let orders = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in orders {
            let events = [g(1), g(2), g(3)];
            let t = task(&events.map(Dependence::Pending));
            let mut host = FakeHost::default();
            t.start(&mut host).unwrap();
            for i in order {
                fire(&mut host, &t, events[i], g(10 + i as u32));
            }
            assert_eq!(host.ready, vec![t.guid()], "order {:?}", order);
            assert_eq!(t.payloads(), vec![Some(g(10)), Some(g(11)), Some(g(12))]);
        }
    }

    #[test]
    fn test_resume_after_refused_registration() {
        let t = task(&[Dependence::Pending(g(1)), Dependence::Pending(g(2))]);
        let mut host = FakeHost::default();
        t.start(&mut host).unwrap();

        host.refuse = 1;
        let w = host.fire(g(1), g(11)).unwrap();
        assert!(matches!(
            t.on_satisfy(&mut host, g(11), w.slot),
            Err(RuntimeError::ResourceExhausted { .. })
        ));
        assert_eq!(t.frontier(), 1);
        assert_eq!(t.satisfied(), 1);
        assert_eq!(host.registrations, vec![g(1)]);

        t.resume(&mut host).unwrap();
        assert_eq!(host.registrations, vec![g(1), g(2)]);
        fire(&mut host, &t, g(2), g(22));
        assert_eq!(host.ready, vec![t.guid()]);
        assert_eq!(t.state(), TaskState::Ready);
    }

    #[test]
    fn test_resume_on_ready_task_is_noop() {
        let t = task(&[Dependence::Resolved(g(1))]);
        let mut host = FakeHost::default();
        t.start(&mut host).unwrap();
        t.resume(&mut host).unwrap();
        assert_eq!(host.ready.len(), 1);
        assert!(host.registrations.is_empty());
    }

    #[test]
    #[should_panic(expected = "satisfied twice")]
    fn test_double_signal_is_fatal() {
        let t = task(&[Dependence::Pending(g(1)), Dependence::Pending(g(2))]);
        let mut host = FakeHost::default();
        t.start(&mut host).unwrap();
        t.on_satisfy(&mut host, g(5), 0).unwrap();
        let _ = t.on_satisfy(&mut host, g(5), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_slot_out_of_range_is_fatal() {
        let t = task(&[Dependence::Pending(g(1))]);
        let _ = t.on_satisfy(&mut FakeHost::default(), g(5), 3);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_run_and_complete() {
        let t = task(&[]);
        t.start(&mut FakeHost::default()).unwrap();
        t.begin_run();
        assert_eq!(t.state(), TaskState::Running);
        t.complete();
        assert_eq!(t.state(), TaskState::Completed);
    }

    #[test]
    #[should_panic(expected = "dependencies satisfied")]
    fn test_run_before_ready_is_fatal() {
        let t = task(&[Dependence::Pending(g(1))]);
        t.begin_run();
    }

    #[test]
    #[should_panic(expected = "cannot go")]
    fn test_run_twice_is_fatal() {
        let t = task(&[]);
        t.start(&mut FakeHost::default()).unwrap();
        t.begin_run();
        t.begin_run();
    }

    #[test]
    fn test_scope_marker() {
        let t = task(&[]);
        assert_eq!(t.scope(), None);
        t.set_scope(g(7));
        assert_eq!(t.scope(), Some(g(7)));
        assert!(!t.clear_scope(g(8)));
        assert!(t.clear_scope(g(7)));
        assert_eq!(t.scope(), None);
    }
}
