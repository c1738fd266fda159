//! Worker 单元测试
//!
//! 测试执行上下文和多线程运行循环

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::runtime::error::RuntimeError;
use crate::runtime::event::EventKind;
use crate::runtime::guid::Guid;
use crate::runtime::scheduler::Workpile;
use crate::runtime::task::{TaskSpec, TaskTemplate};
use crate::runtime::worker::{Runtime, WorkerContext};
use crate::util::config::RuntimeConfig;

fn runtime(workers: usize) -> Runtime {
    Runtime::new(&RuntimeConfig::with_workers(workers)).unwrap()
}

#[test]
fn test_context_enter_leave() {
    let mut ctx = WorkerContext::new(3, Workpile::new());
    assert_eq!(ctx.id(), 3);
    assert_eq!(ctx.current_task(), None);

    let outer = Guid::from_parts(1, 1);
    let inner = Guid::from_parts(2, 1);
    let prev = ctx.enter(outer);
    assert_eq!(prev, None);
    let nested = ctx.enter(inner);
    assert_eq!(nested, Some(outer));
    assert_eq!(ctx.current_task(), Some(inner));
    ctx.leave(nested);
    assert_eq!(ctx.current_task(), Some(outer));
    ctx.leave(prev);
    assert_eq!(ctx.current_task(), None);
}

#[test]
fn test_zero_workers_rejected() {
    assert!(matches!(
        Runtime::new(&RuntimeConfig::with_workers(0)),
        Err(RuntimeError::InvalidArgument(_))
    ));
}

#[test]
fn test_run_until_shutdown_task() {
    let mut rt = runtime(2);
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = hits.clone();

    let value = rt
        .run(move |domain, ctx| {
            let stop = domain.create_template(TaskTemplate::new("stop", 0, 1, move |call| {
                seen.fetch_add(1, Ordering::SeqCst);
                call.shutdown();
                Guid::NULL
            }))?;
            let go = domain.create_event(EventKind::Sticky)?;
            domain.create_task(ctx, TaskSpec::new(stop).deps([go]))?;
            domain.satisfy(ctx, go, Guid::NULL)?;
            Ok(17)
        })
        .unwrap();

    assert_eq!(value, 17);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(rt.domain().is_shutting_down());
}

#[test]
fn test_main_error_stops_workers() {
    let mut rt = runtime(3);
    let result: Result<(), _> = rt.run(|domain, _ctx| {
        domain.destroy_event(Guid::from_parts(5, 9))?;
        Ok(())
    });
    assert!(matches!(result, Err(RuntimeError::StaleHandle(_))));
    assert!(rt.domain().is_shutting_down());
}

#[test]
fn test_fanout_under_finish_scope() {
    const TASKS: u64 = 200;
    let mut rt = runtime(4);
    let counter = Arc::new(AtomicUsize::new(0));
    let leaf_counter = counter.clone();

    rt.run(move |domain, ctx| {
        let leaf = domain.create_template(TaskTemplate::new("leaf", 0, 0, move |_| {
            leaf_counter.fetch_add(1, Ordering::SeqCst);
            Guid::NULL
        }))?;
        let fan = domain.create_template(TaskTemplate::new("fan", 1, 0, move |call| {
            for _ in 0..call.param(0).unwrap_or(0) {
                if call.spawn(TaskSpec::new(leaf)).is_err() {
                    break;
                }
            }
            Guid::NULL
        }))?;
        let stop = domain.create_template(TaskTemplate::new("stop", 0, 1, |call| {
            call.shutdown();
            Guid::NULL
        }))?;

        let scope = domain.create_task(ctx, TaskSpec::new(fan).params([TASKS]).finish().with_output())?;
        let done = scope.output.ok_or(RuntimeError::InvalidArgument("no output".into()))?;
        domain.create_task(ctx, TaskSpec::new(stop).deps([done]))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), TASKS as usize);
    let stats = rt.stats();
    assert_eq!(stats.workers, 4);
    assert_eq!(stats.executed, TASKS as usize + 2);
}

#[test]
fn test_single_worker_runtime() {
    let mut rt = runtime(1);
    let ran = rt
        .run(|domain, ctx| {
            let stop = domain.create_template(TaskTemplate::new("stop", 0, 0, |call| {
                call.shutdown();
                Guid::NULL
            }))?;
            domain.create_task(ctx, TaskSpec::new(stop))?;
            Ok(true)
        })
        .unwrap();
    assert!(ran);
    assert_eq!(rt.stats().executed, 1);
}
