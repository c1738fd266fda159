//! Operations issued as policy messages behave like the direct calls

use flowrt::runtime::policy::{MsgPayload, MsgStatus, PolicyDomain};
use flowrt::{EventKind, Guid, PolicyMsg, TaskSpec, WorkerContext};

use crate::common::{domain, passthrough};

fn send(
    pd: &PolicyDomain,
    ctx: &mut WorkerContext,
    payload: MsgPayload,
) -> PolicyMsg {
    let mut msg = PolicyMsg::new(payload);
    pd.process_message(ctx, &mut msg).unwrap();
    assert_eq!(msg.header.status, MsgStatus::Done);
    msg
}

/// Sticky event, a dependent task with an output, satisfy, take, execute.
/// Returns the output value and the live handle count afterwards.
fn direct() -> (Option<Guid>, usize) {
    let (pd, mut contexts) = domain(1);
    let ctx = &mut contexts[0];
    let template = passthrough(&pd, 1);
    let e = pd.create_event(EventKind::Sticky).unwrap();
    let handles = pd
        .create_task(ctx, TaskSpec::new(template).deps([e]).with_output())
        .unwrap();
    pd.satisfy(ctx, e, Guid::NULL).unwrap();
    let task = pd.take(ctx).unwrap();
    pd.execute_task(ctx, task).unwrap();
    (pd.event_value(handles.output.unwrap()).unwrap(), pd.live_handles())
}

fn by_message() -> (Option<Guid>, usize) {
    let (pd, mut contexts) = domain(1);
    let ctx = &mut contexts[0];
    let template = passthrough(&pd, 1);

    let e = send(&pd, ctx, MsgPayload::CreateEvent {
        kind: EventKind::Sticky,
        guid: Guid::NULL,
    })
    .created()
    .unwrap();
    let create = send(&pd, ctx, PolicyMsg::create_task(TaskSpec::new(template).deps([e]).with_output()).payload);
    let output = match create.payload {
        MsgPayload::CreateTask { output, .. } => output.unwrap(),
        other => panic!("unexpected payload {:?}", other),
    };
    send(&pd, ctx, MsgPayload::Satisfy {
        target: e,
        slot: 0,
        payload: Guid::NULL,
    });
    let taken = send(&pd, ctx, MsgPayload::Take {
        count: 1,
        tasks: Vec::new(),
    });
    let MsgPayload::Take { tasks, .. } = taken.payload else {
        panic!("unexpected payload");
    };
    assert_eq!(tasks.len(), 1);
    pd.execute_task(ctx, tasks[0]).unwrap();
    (pd.event_value(output).unwrap(), pd.live_handles())
}

#[test]
fn test_message_path_matches_direct_calls() {
    assert_eq!(direct(), by_message());
}

#[test]
fn test_message_json_transport() {
    let (pd, mut contexts) = domain(2);
    let ctx = &mut contexts[1];

    // Encode, ship, decode, process, ship back.
    let request = serde_json::to_string(&PolicyMsg::create_event(EventKind::Latch)).unwrap();
    let mut msg: PolicyMsg = serde_json::from_str(&request).unwrap();
    pd.process_message(ctx, &mut msg).unwrap();
    let response: PolicyMsg = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();

    assert_eq!(response.header.source, 1);
    assert!(response.is_done());
    let latch = response.created().unwrap();
    assert_eq!(pd.event(latch).unwrap().kind(), EventKind::Latch);
}

#[test]
fn test_give_and_take_by_message() {
    let (pd, mut contexts) = domain(2);
    let task = Guid::from_parts(10, 1);
    send(&pd, &mut contexts[0], MsgPayload::Give { tasks: vec![task] });

    // Worker 1 steals it.
    let taken = send(&pd, &mut contexts[1], MsgPayload::Take {
        count: 3,
        tasks: Vec::new(),
    });
    assert_eq!(
        taken.payload,
        MsgPayload::Take {
            count: 3,
            tasks: vec![task]
        }
    );
}
