// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use approx::assert_relative_eq;
use archsim_behaviour::interpretation::CallKind;
use archsim_model::behaviour::{ActionKind, Behaviour, InfrastructureCall, ParametricDemand};
use archsim_model::expr::{Expr, Value};
use archsim_model::ids::{RoleId, SignatureId};

mod common;
use common::setup;

fn query_with_size(size: i64) -> ActionKind {
    ActionKind::ExternalCall {
        role: RoleId::new("db"),
        signature: SignatureId::new("query"),
        inputs: vec![("size".to_string(), Expr::int(size))],
    }
}

#[test]
fn external_call_returns_to_caller() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.provide(
        "db",
        "query",
        Behaviour::sequence("query", vec![("read", ActionKind::demand("HDD", Expr::var("size")))]),
    );
    let caller = Behaviour::sequence(
        "caller",
        vec![
            ("call", query_with_size(2)),
            ("process", ActionKind::demand("CPU", Expr::int(1))),
        ],
    );

    let request = driver.start(&mut engine, &caller);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.calls.len(), 1);
    assert_eq!(driver.calls[0].1.kind, CallKind::External);
    assert_eq!(driver.calls[0].1.inputs, vec![("size".to_string(), Value::Int(2))]);

    assert_eq!(driver.demanded_types(), vec!["HDD", "CPU"]);
    // The callee runs in the assembly providing the operation
    assert_eq!(driver.demands[0].1.assembly.as_str(), "db");
    assert_eq!(driver.demands[1].1.assembly.as_str(), "ctx");
    assert_relative_eq!(driver.finish_time(request).unwrap(), 3.0);
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn nested_calls_unwind_in_order() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.provide(
        "db",
        "query",
        Behaviour::sequence(
            "query",
            vec![
                ("read", ActionKind::demand("HDD", Expr::var("size"))),
                ("log", ActionKind::external_call("logger", "write")),
            ],
        ),
    );
    driver.provide(
        "logger",
        "write",
        Behaviour::sequence("write", vec![("append", ActionKind::demand("HDD", Expr::double(0.5)))]),
    );
    let caller = Behaviour::sequence(
        "caller",
        vec![
            ("call", query_with_size(1)),
            ("call again", query_with_size(2)),
        ],
    );

    let request = driver.start(&mut engine, &caller);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.calls.len(), 4);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 4.0);
}

#[test]
fn callee_does_not_see_caller_variables() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.provide(
        "db",
        "query",
        Behaviour::sequence(
            "query",
            vec![(
                "repeat",
                ActionKind::Loop {
                    iterations: Expr::var("x"),
                    body: Behaviour::empty("body"),
                },
            )],
        ),
    );
    let caller = Behaviour::sequence(
        "caller",
        vec![
            (
                "x",
                ActionKind::SetVariable {
                    assignments: vec![("x".to_string(), Expr::int(1))],
                },
            ),
            ("call", ActionKind::external_call("db", "query")),
        ],
    );

    let request = driver.start(&mut engine, &caller);
    engine.run(&mut driver).unwrap();

    assert!(driver.finished.is_empty());
    assert_eq!(driver.aborted.len(), 1);
    assert_eq!(driver.aborted[0].1, request);
    assert!(driver.aborted[0].2.contains("Unbound variable 'x'"));
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn call_without_provider_aborts_request() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let caller = Behaviour::sequence(
        "caller",
        vec![
            ("work", ActionKind::demand("CPU", Expr::int(1))),
            ("call", ActionKind::external_call("nobody", "anything")),
        ],
    );

    let request = driver.start(&mut engine, &caller);
    engine.run(&mut driver).unwrap();

    assert!(driver.finished.is_empty());
    assert_eq!(driver.aborted.len(), 1);
    let (time, aborted, reason) = &driver.aborted[0];
    assert_eq!(*aborted, request);
    assert_relative_eq!(*time, 1.0);
    assert!(reason.contains("nobody.anything"), "{reason}");
    assert!(reason.contains("no provider"), "{reason}");
}

#[test]
fn infrastructure_calls_run_after_demands() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.provide(
        "middleware",
        "marshal",
        Behaviour::sequence("marshal", vec![("encode", ActionKind::demand("CPU", Expr::double(0.5)))]),
    );
    let mut call = InfrastructureCall::new("middleware", "marshal", Expr::int(2));
    call.inputs.push(("bytes".to_string(), Expr::int(64)));
    let behaviour = Behaviour::sequence(
        "send",
        vec![
            (
                "prepare",
                ActionKind::InternalAction {
                    demands: vec![ParametricDemand::new("CPU", Expr::int(1))],
                    infrastructure_calls: vec![call],
                },
            ),
            ("after", ActionKind::demand("NET", Expr::int(1))),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    let call_times: Vec<f64> = driver.calls.iter().map(|(time, _)| *time).collect();
    assert_eq!(call_times.len(), 2);
    assert_relative_eq!(call_times[0], 1.0);
    assert_relative_eq!(call_times[1], 1.5);
    for (_, call) in &driver.calls {
        assert_eq!(call.kind, CallKind::Infrastructure);
        assert_eq!(call.inputs, vec![("bytes".to_string(), Value::Int(64))]);
    }

    assert_eq!(driver.demanded_types(), vec!["CPU", "CPU", "CPU", "NET"]);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 3.0);
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn infrastructure_calls_without_demands() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.provide("middleware", "log", Behaviour::empty("log"));
    let behaviour = Behaviour::sequence(
        "logging",
        vec![
            (
                "log",
                ActionKind::InternalAction {
                    demands: Vec::new(),
                    infrastructure_calls: vec![InfrastructureCall::new(
                        "middleware",
                        "log",
                        Expr::int(3),
                    )],
                },
            ),
            (
                "log nothing",
                ActionKind::InternalAction {
                    demands: Vec::new(),
                    infrastructure_calls: vec![InfrastructureCall::new(
                        "middleware",
                        "log",
                        Expr::int(0),
                    )],
                },
            ),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.calls.len(), 3);
    assert!(driver.demands.is_empty());
    assert_relative_eq!(driver.finish_time(request).unwrap(), 0.0);
}

#[test]
fn calls_inside_fork_members() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.provide(
        "db",
        "query",
        Behaviour::sequence("query", vec![("read", ActionKind::demand("HDD", Expr::var("size")))]),
    );
    let behaviour = Behaviour::sequence(
        "parallel queries",
        vec![(
            "fork",
            ActionKind::Fork {
                synchronised: vec![
                    Behaviour::sequence("q1", vec![("call", query_with_size(1))]),
                    Behaviour::sequence("q2", vec![("call", query_with_size(3))]),
                ],
            },
        )],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.calls.len(), 2);
    assert_eq!(driver.finished.len(), 1);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 3.0);
}
