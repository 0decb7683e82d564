//! Handler suspension, sub-calls and frame timing through the public API

use eventloom::compiler::{CoreCompiler, InstructionCompiler};
use eventloom::config::EngineConfig;
use eventloom::runtime::{EventHandler, HandlerList, HandlerState, Runtime};
use eventloom::types::{Sequence, SequenceRef};
use serde_json::{Value, json};

fn sequence(compiler: &CoreCompiler, id: &str, commands: Value) -> SequenceRef {
    let steps = compiler.compile(&commands, id).unwrap();
    Sequence::builder("common").id(id).steps(steps).build()
}

fn frames(rt: &Runtime, count: usize, delta: f64) {
    for _ in 0..count {
        rt.update(delta);
    }
}

#[test]
fn test_wait_spans_frames_and_resumes_in_the_same_update() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    let handler = rt.call_sequence(sequence(
        &compiler,
        "timed",
        json!([
            { "op": "log", "message": "start" },
            { "op": "wait", "duration": 50 },
            { "op": "log", "message": "end" }
        ]),
    ));
    assert_eq!(handler.state(), HandlerState::SuspendedTimed);

    // The first frame only makes the handler active
    frames(&rt, 4, 16.0);
    assert_eq!(compiler.transcript().lines(), vec!["start"]);
    assert!(rt.registry().active().contains(&handler));

    frames(&rt, 1, 16.0);
    assert_eq!(compiler.transcript().lines(), vec!["start", "end"]);
    assert!(handler.is_complete());
    assert!(rt.registry().active().is_empty());
}

#[test]
fn test_pause_holds_until_resumed() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    let handler = rt.call_sequence(sequence(
        &compiler,
        "gate",
        json!([{ "op": "pause" }, { "op": "log", "message": "through" }]),
    ));

    frames(&rt, 20, 16.0);
    assert_eq!(handler.state(), HandlerState::SuspendedIndefinite);
    assert!(compiler.transcript().is_empty());

    handler.resume();
    frames(&rt, 1, 16.0);
    assert_eq!(compiler.transcript().lines(), vec!["through"]);
    assert!(handler.is_complete());
}

#[test]
fn test_called_event_returns_to_caller() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.registry().load(sequence(
        &compiler,
        "helper",
        json!([
            { "op": "log", "message": "helper" },
            { "op": "wait", "duration": 10 },
            { "op": "log", "message": "helper done" }
        ]),
    ));
    let handler = rt.call_sequence(sequence(
        &compiler,
        "main",
        json!([
            { "op": "call", "event": "helper" },
            { "op": "call", "event": "missing" },
            { "op": "log", "message": "main done" }
        ]),
    ));
    assert_eq!(handler.call_depth(), 1);

    frames(&rt, 2, 16.0);

    assert_eq!(
        compiler.transcript().lines(),
        vec!["helper", "helper done", "main done"]
    );
    assert_eq!(handler.call_depth(), 0);
    assert!(handler.is_complete());
}

#[test]
fn test_loop_with_wait_counts_frames() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    let handler = rt.call_sequence(sequence(
        &compiler,
        "ticker",
        json!([
            { "op": "label", "name": "top" },
            { "op": "add", "key": "ticks", "value": 1 },
            { "op": "wait", "duration": 16 },
            { "op": "jump_if", "key": "ticks", "cmp": "lt", "value": 5, "label": "top" },
            { "op": "log", "message": "ticks={ticks}" }
        ]),
    ));

    frames(&rt, 10, 16.0);

    assert!(handler.is_complete());
    assert_eq!(compiler.transcript().lines(), vec!["ticks=5"]);
}

#[test]
fn test_finish_command_skips_remaining_steps() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    let handler = rt.call_sequence(sequence(
        &compiler,
        "early",
        json!([
            { "op": "log", "message": "before" },
            { "op": "finish" },
            { "op": "log", "message": "after" }
        ]),
    ));

    assert!(handler.is_complete());
    assert_eq!(compiler.transcript().lines(), vec!["before"]);
}

#[test]
fn test_time_scale_slows_handlers() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.set_time_scale(0.5, 0.0);
    let handler = rt.call_sequence(sequence(&compiler, "slow", json!([{ "op": "wait", "duration": 40 }])));

    frames(&rt, 5, 16.0);
    assert!(!handler.is_complete());

    frames(&rt, 1, 16.0);
    assert!(handler.is_complete());
}

#[test]
fn test_pause_gates_normal_handlers_only() {
    let rt = Runtime::default();
    let normal = rt.call_sequence(Sequence::builder("common").step(|ctx| ctx.wait(10.0)).build());
    let urgent = Sequence::builder("common").step(|ctx| ctx.wait(10.0)).build();
    let urgent = {
        let handler = EventHandler::new(urgent);
        handler.set_priority(true);
        rt.call(handler, None)
    };
    rt.update(16.0);

    rt.set_paused(true);
    rt.update(16.0);
    assert!(!normal.is_complete());
    assert!(urgent.is_complete());

    rt.set_paused(false);
    rt.update(16.0);
    assert!(normal.is_complete());
}

#[test]
fn test_custom_tracking_list() {
    let rt = Runtime::default();
    let list = HandlerList::new();
    let handler = rt.call(
        EventHandler::new(Sequence::builder("common").step(|ctx| ctx.pause()).build()),
        Some(&list),
    );

    rt.update(16.0);
    assert!(list.contains(&handler));
    assert!(rt.registry().active().is_empty());

    handler.finish();
    rt.update(16.0);
    assert!(list.is_empty());
}

#[test]
fn test_step_limit_stops_runaway_loops() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::new(EngineConfig::default().with_step_limit(100));
    let handler = rt.call_sequence(sequence(
        &compiler,
        "spin",
        json!([
            { "op": "label", "name": "again" },
            { "op": "jump", "label": "again" }
        ]),
    ));

    assert!(handler.is_complete());
}

#[test]
fn test_shutdown_clears_everything() {
    let rt = Runtime::default();
    let handler = rt.call_sequence(Sequence::builder("common").step(|ctx| ctx.pause()).build());
    rt.register("k", "tick", Sequence::builder("tick").build());
    rt.update(16.0);

    rt.shutdown();

    assert!(handler.is_complete());
    assert!(rt.registry().active().is_empty());
    assert!(rt.registry().registered("k").is_none());
    assert!(rt.queue().is_empty());
}
