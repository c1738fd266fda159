//! Finish scopes on real worker threads

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flowrt::runtime::policy::TaskCall;
use flowrt::{Guid, Runtime, RuntimeError, TaskSpec, TaskTemplate};
use proptest::prelude::*;

use crate::common::config;

/// Result of one tree run.
struct TreeRun {
    leaves: usize,
    root_value: Option<Guid>,
    returned: Guid,
    executed: usize,
}

fn node(
    call: &mut TaskCall<'_>,
    leaves: &AtomicUsize,
) -> Guid {
    let depth = call.param(0).unwrap();
    let fanout = call.param(1).unwrap();
    let this = Guid::from_raw(call.param(2).unwrap());
    if depth == 0 {
        leaves.fetch_add(1, Ordering::SeqCst);
        return Guid::NULL;
    }
    for _ in 0..fanout {
        let spec = TaskSpec::new(this).params([depth - 1, fanout, this.raw()]).finish();
        if call.spawn(spec).is_err() {
            break;
        }
    }
    Guid::NULL
}

fn run_tree(
    workers: usize,
    depth: u64,
    fanout: u64,
) -> TreeRun {
    let leaves = Arc::new(AtomicUsize::new(0));
    let root_value = Arc::new(Mutex::new(None));
    let mut runtime = Runtime::new(&config(workers)).unwrap();

    let counted = leaves.clone();
    let seen = root_value.clone();
    let returned = runtime
        .run(move |domain, ctx| {
            let tree = domain.create_template(TaskTemplate::new("node", 3, 0, move |call| {
                node(call, &counted)
            }))?;
            // The root returns a data block so the output value is recognisable.
            let marker = domain.create_datablock(1)?;
            let root = domain.create_template(TaskTemplate::new("root", 2, 0, move |call| {
                let spec = TaskSpec::new(tree).params([call.param(0).unwrap(), call.param(1).unwrap(), tree.raw()]).finish();
                if call.spawn(spec).is_err() {
                    return Guid::NULL;
                }
                marker
            }))?;
            let stop = domain.create_template(TaskTemplate::new("stop", 0, 1, move |call| {
                *seen.lock().unwrap() = call.dep(0).map(|d| d.guid);
                call.shutdown();
                Guid::NULL
            }))?;

            let handles = domain.create_task(ctx, TaskSpec::new(root).params([depth, fanout]).finish().with_output())?;
            let output = handles.output.ok_or(RuntimeError::InvalidArgument("no output".into()))?;
            domain.create_task(ctx, TaskSpec::new(stop).deps([output]))?;
            Ok(marker)
        })
        .unwrap();

    let value = *root_value.lock().unwrap();
    TreeRun {
        leaves: leaves.load(Ordering::SeqCst),
        root_value: value,
        returned,
        executed: runtime.stats().executed,
    }
}

#[test]
fn test_root_output_carries_root_value() {
    let run = run_tree(4, 3, 4);
    assert_eq!(run.leaves, 64);
    assert_eq!(run.root_value, Some(run.returned));
    // root + 1 + 4 + 16 + 64 nodes + stop
    assert_eq!(run.executed, 1 + 85 + 1);
}

#[test]
fn test_deep_narrow_tree() {
    let run = run_tree(2, 30, 1);
    assert_eq!(run.leaves, 1);
    assert_eq!(run.root_value, Some(run.returned));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every leaf completes before the root scope closes, and it closes once.
    #[test]
    fn tree_completes_once(
        workers in 1usize..5,
        depth in 0u64..4,
        fanout in 1u64..4,
    ) {
        let run = run_tree(workers, depth, fanout);
        prop_assert_eq!(run.leaves as u64, fanout.pow(depth as u32));
        prop_assert_eq!(run.root_value, Some(run.returned));
    }
}
