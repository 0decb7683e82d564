//! Dispatch through the global registry, driven by compiled commands

use eventloom::compiler::{CoreCompiler, InstructionCompiler};
use eventloom::runtime::{DispatchOptions, Runtime};
use eventloom::types::{Sequence, SequenceRef};
use serde_json::{Value, json};

fn compile(compiler: &CoreCompiler, event_type: &str, id: &str, commands: Value) -> SequenceRef {
    let steps = compiler.compile(&commands, id).unwrap();
    Sequence::builder(event_type).id(id).steps(steps).build()
}

fn say(text: &str) -> Value {
    json!({ "op": "log", "message": text })
}

#[test]
fn test_dispatch_runs_events_in_load_order() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.registry().load(compile(&compiler, "ring", "a", json!([say("a")])));
    rt.registry().load(compile(&compiler, "ring", "b", json!([say("b")])));
    rt.registry().load(compile(&compiler, "other", "c", json!([say("c")])));

    rt.emit("ring");

    assert_eq!(compiler.transcript().lines(), vec!["a", "b"]);
}

#[test]
fn test_registered_event_is_dispatched_after_next_frame() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.register("door", "open", compile(&compiler, "open", "door-open", json!([say("creak")])));

    rt.emit("open");
    assert!(compiler.transcript().is_empty());

    rt.update(16.0);
    rt.emit("open");
    assert_eq!(compiler.transcript().lines(), vec!["creak"]);

    rt.unregister("door");
    rt.emit("open");
    assert_eq!(compiler.transcript().len(), 1);
}

#[test]
fn test_highest_priority_reorders_and_filters() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.registry().load(compile(&compiler, "ring", "a", json!([say("a")])));
    rt.registry().load(compile(&compiler, "ring", "b", json!([say("b")])));

    rt.set_highest_priority("b");
    rt.emit("ring");
    rt.update(16.0);
    rt.emit("ring");
    rt.dispatch("ring", DispatchOptions::new().priority(true));
    rt.dispatch("ring", DispatchOptions::new().priority(false));

    assert_eq!(
        compiler.transcript().lines(),
        vec!["a", "b", "b", "a", "b", "a"]
    );
}

#[test]
fn test_enable_from_an_event_applies_at_flush() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    let secret = Sequence::builder("ring")
        .id("secret")
        .enabled(false)
        .steps(compiler.compile(&json!([say("secret")]), "secret").unwrap())
        .build();
    rt.registry().load(secret);
    rt.registry().load(compile(
        &compiler,
        "unlock",
        "unlocker",
        json!([{ "op": "enable", "event": "secret" }]),
    ));

    rt.emit("unlock");
    rt.emit("ring");
    assert!(compiler.transcript().is_empty());

    rt.update(16.0);
    rt.emit("ring");
    assert_eq!(compiler.transcript().lines(), vec!["secret"]);
}

#[test]
fn test_disable_takes_effect_immediately() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.registry().load(compile(&compiler, "ring", "bell", json!([say("ding")])));

    rt.disable("bell");
    rt.emit("ring");

    assert!(compiler.transcript().is_empty());
    rt.reset();
    rt.emit("ring");
    assert_eq!(compiler.transcript().lines(), vec!["ding"]);
}

#[test]
fn test_input_dispatch_stops_at_stop_propagation() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    for (event_type, prefix) in [("keydown", "key"), ("ring", "ring")] {
        rt.registry().load(compile(
            &compiler,
            event_type,
            &format!("{prefix}-first"),
            json!([{ "op": "stop_propagation" }, say(&format!("{prefix} first"))]),
        ));
        rt.registry().load(compile(
            &compiler,
            event_type,
            &format!("{prefix}-second"),
            json!([say(&format!("{prefix} second"))]),
        ));
    }

    rt.emit("keydown");
    rt.emit("ring");

    assert_eq!(
        compiler.transcript().lines(),
        vec!["key first", "ring first", "ring second"]
    );
    assert_eq!(rt.bubbles().depth(), 0);
}

#[test]
fn test_emit_command_dispatches_nested() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.registry().load(compile(
        &compiler,
        "go",
        "outer",
        json!([say("outer"), { "op": "emit", "type": "inner" }, say("after")]),
    ));
    rt.registry().load(compile(&compiler, "inner", "inner", json!([say("inner")])));

    rt.emit("go");

    assert_eq!(compiler.transcript().lines(), vec!["outer", "inner", "after"]);
}

#[test]
fn test_emit_with_inherit_shares_attributes() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.registry().load(compile(
        &compiler,
        "hit",
        "attack",
        json!([
            { "op": "set", "key": "damage", "value": 7 },
            { "op": "emit", "type": "damage", "inherit": true },
            say("hp left {hp}")
        ]),
    ));
    rt.registry().load(compile(
        &compiler,
        "damage",
        "apply",
        json!([say("took {damage}"), { "op": "set", "key": "hp", "value": 3 }]),
    ));

    rt.emit("hit");

    assert_eq!(compiler.transcript().lines(), vec!["took 7", "hp left 3"]);
}

#[test]
fn test_unregister_during_dispatch_keeps_the_visited_set() {
    let compiler = CoreCompiler::new();
    let rt = Runtime::default();
    rt.register("x", "tick", compile(&compiler, "tick", "x", json!([say("x")])));
    let y = Sequence::builder("tick")
        .id("y")
        .step(|ctx| {
            ctx.runtime().unregister("z");
            true
        })
        .steps(compiler.compile(&json!([say("y")]), "y").unwrap())
        .build();
    rt.register("y", "tick", y);
    rt.register("z", "tick", compile(&compiler, "tick", "z", json!([say("z")])));
    rt.update(16.0);

    rt.emit("tick");
    rt.emit("tick");

    assert_eq!(compiler.transcript().lines(), vec!["x", "y", "z", "x", "y"]);
}
