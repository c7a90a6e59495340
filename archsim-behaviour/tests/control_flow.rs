// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::sync::Arc;

use approx::assert_relative_eq;
use archsim_model::behaviour::{Action, ActionKind, Behaviour, BranchTransition, ParametricDemand};
use archsim_model::expr::{BinaryOp, Bindings, Expr, Value};
use archsim_model::ids::ActionId;
use archsim_model::request::Demand;

mod common;
use common::setup;

fn work(resource_type: &str, amount: f64) -> ActionKind {
    ActionKind::demand(resource_type, Expr::double(amount))
}

fn set(name: &str, value: Expr) -> ActionKind {
    ActionKind::SetVariable {
        assignments: vec![(name.to_string(), value)],
    }
}

fn probabilistic(transitions: Vec<(f64, Arc<Behaviour>)>) -> ActionKind {
    ActionKind::Branch {
        transitions: transitions
            .into_iter()
            .map(|(probability, body)| BranchTransition::Probabilistic { probability, body })
            .collect(),
    }
}

fn guarded(transitions: Vec<(Expr, Arc<Behaviour>)>) -> ActionKind {
    ActionKind::Branch {
        transitions: transitions
            .into_iter()
            .map(|(guard, body)| BranchTransition::Guarded { guard, body })
            .collect(),
    }
}

fn looped(iterations: Expr, body: Arc<Behaviour>) -> ActionKind {
    ActionKind::Loop { iterations, body }
}

fn single(name: &str, resource_type: &str, amount: f64) -> Arc<Behaviour> {
    Behaviour::sequence(name, vec![("work", work(resource_type, amount))])
}

#[test]
fn sequence_runs_actions_in_order() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "seq",
        vec![("a", work("CPU", 2.0)), ("b", work("HDD", 3.0))],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.demanded_types(), vec!["CPU", "HDD"]);
    assert_relative_eq!(driver.demands[1].0, 2.0);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 5.0);
    assert_eq!(driver.coordinator.num_live_requests(), 0);
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn demands_of_one_action_are_joined() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "joined",
        vec![
            (
                "both",
                ActionKind::InternalAction {
                    demands: vec![
                        ParametricDemand::new("CPU", Expr::int(1)),
                        ParametricDemand::new("HDD", Expr::int(4)),
                    ],
                    infrastructure_calls: Vec::new(),
                },
            ),
            ("after", work("NET", 1.0)),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.demanded_types(), vec!["CPU", "HDD", "NET"]);
    // The third demand waits for the slower of the first two
    assert_relative_eq!(driver.demands[2].0, 4.0);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 5.0);
    assert_eq!(driver.coordinator.num_pending_joins(), 0);
}

#[test]
fn loop_finishes_after_last_iteration() {
    for iterations in [1, 3, 7] {
        let (mut engine, mut driver) = setup(file!(), 1);
        let behaviour = Behaviour::sequence(
            "loop",
            vec![
                ("repeat", looped(Expr::int(iterations), single("body", "CPU", 1.0))),
                ("after", work("HDD", 0.5)),
            ],
        );

        let request = driver.start(&mut engine, &behaviour);
        engine.run(&mut driver).unwrap();

        let mut expected = vec!["CPU"; iterations as usize];
        expected.push("HDD");
        assert_eq!(driver.demanded_types(), expected);
        assert_relative_eq!(driver.finish_time(request).unwrap(), iterations as f64 + 0.5);
        assert_eq!(driver.finished.len(), 1);
    }
}

#[test]
fn loop_with_zero_iterations_is_skipped() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "loop",
        vec![
            ("repeat", looped(Expr::int(0), single("body", "CPU", 1.0))),
            ("after", work("HDD", 0.5)),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.demanded_types(), vec!["HDD"]);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 0.5);
}

#[test]
fn nested_loops_multiply() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let inner = Behaviour::sequence(
        "inner",
        vec![("inner loop", looped(Expr::int(3), single("body", "CPU", 1.0)))],
    );
    let behaviour = Behaviour::sequence("outer", vec![("outer loop", looped(Expr::int(2), inner))]);

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.demands.len(), 6);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 6.0);
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn loop_count_from_request_parameter() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "loop",
        vec![("repeat", looped(Expr::var("n"), single("body", "CPU", 1.0)))],
    );

    let mut bindings = Bindings::new();
    bindings.set("n", Value::Int(4));
    let request = driver.start_with(&mut engine, &behaviour, bindings);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.demands.len(), 4);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 4.0);
}

#[test]
fn fork_joins_once_all_members_finish() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "fork",
        vec![
            (
                "fork",
                ActionKind::Fork {
                    synchronised: vec![
                        single("m0", "CPU", 1.0),
                        single("m1", "CPU", 3.0),
                        single("m2", "CPU", 2.0),
                    ],
                },
            ),
            ("after", work("HDD", 1.0)),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    // All members run concurrently, the parent continues exactly once
    assert_eq!(driver.demanded_types(), vec!["CPU", "CPU", "CPU", "HDD"]);
    assert_relative_eq!(driver.demands[3].0, 3.0);
    assert_eq!(driver.finished.len(), 1);
    assert_relative_eq!(driver.finish_time(request).unwrap(), 4.0);
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn fork_members_finishing_together_join_once() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "fork",
        vec![
            (
                "fork",
                ActionKind::Fork {
                    synchronised: vec![
                        Behaviour::empty("m0"),
                        Behaviour::empty("m1"),
                        Behaviour::empty("m2"),
                    ],
                },
            ),
            ("after", work("HDD", 1.0)),
        ],
    );

    driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.demanded_types(), vec!["HDD"]);
    assert_eq!(driver.finished.len(), 1);
    assert!(driver.aborted.is_empty());
}

#[test]
fn forks_inside_loops_are_released_after_joining() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let body = Behaviour::sequence(
        "body",
        vec![(
            "fork",
            ActionKind::Fork {
                synchronised: vec![single("m0", "CPU", 1.0), Behaviour::empty("m1")],
            },
        )],
    );
    let behaviour = Behaviour::sequence("repeat", vec![("loop", looped(Expr::int(1000), body))]);

    let request = driver.start(&mut engine, &behaviour);
    engine.run_until(&mut driver, 500.5).unwrap();

    // Root, loop and the fork of the iteration in progress
    assert!(driver.coordinator.is_live(request));
    assert_eq!(driver.coordinator.num_contexts(), 3);

    engine.run(&mut driver).unwrap();
    assert_relative_eq!(driver.finish_time(request).unwrap(), 1000.0);
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn forks_joining_at_once_inside_loops_are_released() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let body = Behaviour::sequence(
        "body",
        vec![
            (
                "fork",
                ActionKind::Fork {
                    synchronised: vec![Behaviour::empty("m0"), Behaviour::empty("m1")],
                },
            ),
            ("work", work("CPU", 1.0)),
        ],
    );
    let behaviour = Behaviour::sequence("repeat", vec![("loop", looped(Expr::int(1000), body))]);

    let request = driver.start(&mut engine, &behaviour);
    engine.run_until(&mut driver, 500.5).unwrap();

    // Root and loop only, every fork so far has been joined
    assert_eq!(driver.coordinator.num_contexts(), 2);

    engine.run(&mut driver).unwrap();
    assert_relative_eq!(driver.finish_time(request).unwrap(), 1000.0);
    assert!(driver.aborted.is_empty());
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn probabilistic_branch_never_takes_zero_weight() {
    let (mut engine, mut driver) = setup(file!(), 5);
    let behaviour = Behaviour::sequence(
        "branch",
        vec![(
            "choose",
            probabilistic(vec![
                (0.0, single("never", "A", 1.0)),
                (1.0, single("always", "B", 1.0)),
            ]),
        )],
    );

    for _ in 0..50 {
        driver.start(&mut engine, &behaviour);
    }
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.finished.len(), 50);
    assert!(driver.demanded_types().iter().all(|t| t == "B"));
}

#[test]
fn probabilistic_branch_takes_both_paths() {
    let (mut engine, mut driver) = setup(file!(), 5);
    let behaviour = Behaviour::sequence(
        "branch",
        vec![(
            "choose",
            probabilistic(vec![
                (0.25, single("left", "A", 1.0)),
                (0.75, single("right", "B", 1.0)),
            ]),
        )],
    );

    for _ in 0..400 {
        driver.start(&mut engine, &behaviour);
    }
    engine.run(&mut driver).unwrap();

    let types = driver.demanded_types();
    let num_a = types.iter().filter(|t| *t == "A").count();
    assert_eq!(types.len(), 400);
    assert!(num_a > 50 && num_a < 150, "{num_a} of 400 took the left path");
}

#[test]
fn guarded_branch_takes_first_enabled_transition() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let gt = |value| Expr::binary(BinaryOp::Gt, Expr::var("x"), Expr::int(value));
    let behaviour = Behaviour::sequence(
        "branch",
        vec![
            ("x", set("x", Expr::int(2))),
            (
                "choose",
                guarded(vec![
                    (gt(5), single("big", "A", 1.0)),
                    (gt(1), single("medium", "B", 1.0)),
                    (Expr::bool(true), single("small", "C", 1.0)),
                ]),
            ),
        ],
    );

    driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.demanded_types(), vec!["B"]);
}

#[test]
fn variables_set_in_branch_are_visible_after_it() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let body = Behaviour::sequence("body", vec![("y", set("y", Expr::double(3.0)))]);
    let behaviour = Behaviour::sequence(
        "branch",
        vec![
            ("choose", guarded(vec![(Expr::bool(true), body)])),
            ("use y", ActionKind::demand("CPU", Expr::var("y"))),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_relative_eq!(driver.finish_time(request).unwrap(), 3.0);
}

#[test]
fn branch_without_enabled_transition_aborts() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "branch",
        vec![
            ("before", work("CPU", 1.0)),
            (
                "choose",
                guarded(vec![(Expr::bool(false), single("never", "A", 1.0))]),
            ),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert!(driver.finished.is_empty());
    assert_eq!(driver.aborted.len(), 1);
    let (time, aborted, reason) = &driver.aborted[0];
    assert_relative_eq!(*time, 1.0);
    assert_eq!(*aborted, request);
    assert!(reason.contains("no enabled transition"), "{reason}");
    assert_eq!(driver.coordinator.num_contexts(), 0);
    assert_eq!(driver.coordinator.num_live_requests(), 0);
}

#[test]
fn configuration_errors_abort_only_their_request() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let no_start = Arc::new(Behaviour::new(
        "no start",
        vec![Action::new("stop", ActionKind::Stop, None)],
    ));
    let empty_fork = Behaviour::sequence(
        "empty fork",
        vec![(
            "fork",
            ActionKind::Fork {
                synchronised: Vec::new(),
            },
        )],
    );
    let no_stop = Arc::new(Behaviour::new(
        "no stop",
        vec![
            Action::new("start", ActionKind::Start, Some(ActionId(1))),
            Action::new("work", work("CPU", 1.0), None),
        ],
    ));
    let fine = single("fine", "CPU", 2.0);

    let broken = [
        driver.start(&mut engine, &no_start),
        driver.start(&mut engine, &empty_fork),
        driver.start(&mut engine, &no_stop),
    ];
    let ok = driver.start(&mut engine, &fine);
    engine.run(&mut driver).unwrap();

    let aborted: Vec<_> = driver.aborted.iter().map(|(_, id, _)| *id).collect();
    assert_eq!(aborted.len(), 3);
    for id in broken {
        assert!(aborted.contains(&id));
    }
    assert!(driver
        .aborted
        .iter()
        .any(|(_, _, reason)| reason.contains("no synchronised behaviours")));
    assert_relative_eq!(driver.finish_time(ok).unwrap(), 2.0);
}

#[test]
fn cycle_without_stop_aborts_request() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let spinning = Arc::new(Behaviour::new(
        "spinning",
        vec![
            Action::new("start", ActionKind::Start, Some(ActionId(1))),
            Action::new("count", set("x", Expr::int(1)), Some(ActionId(0))),
        ],
    ));
    // The cycle is only reached inside the loop body
    let outer = Behaviour::sequence(
        "outer",
        vec![("work", work("CPU", 1.0)), ("loop", looped(Expr::int(2), spinning.clone()))],
    );
    let fine = single("fine", "CPU", 2.0);

    let direct = driver.start(&mut engine, &spinning);
    let nested = driver.start(&mut engine, &outer);
    let ok = driver.start(&mut engine, &fine);
    engine.run(&mut driver).unwrap();

    assert_relative_eq!(engine.time_now(), 2.0);
    let aborted: Vec<_> = driver.aborted.iter().map(|(_, id, _)| *id).collect();
    assert_eq!(aborted, vec![direct, nested]);
    assert!(driver
        .aborted
        .iter()
        .all(|(_, _, reason)| reason.contains("without reaching a stop action")));
    assert_relative_eq!(driver.aborted[1].0, 1.0);
    assert_relative_eq!(driver.finish_time(ok).unwrap(), 2.0);
    assert!(!driver.coordinator.is_live(direct));
    assert!(!driver.coordinator.is_live(nested));
    assert_eq!(driver.coordinator.num_contexts(), 0);
}

#[test]
fn acquire_and_release_permits() {
    let (mut engine, mut driver) = setup(file!(), 1);
    let behaviour = Behaviour::sequence(
        "critical",
        vec![
            ("lock", ActionKind::acquire("pool", 2)),
            ("work", work("CPU", 1.0)),
            ("unlock", ActionKind::release("pool", 2)),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert!(matches!(
        driver.demands[0].1.demand,
        Demand::Passive { amount: 2, .. }
    ));
    assert_eq!(driver.releases.len(), 1);
    assert_relative_eq!(driver.releases[0].0, 1.0);
    assert_eq!(driver.releases[0].1.amount, 2);
    assert_eq!(driver.releases[0].1.semaphore.as_str(), "pool");
    assert_relative_eq!(driver.finish_time(request).unwrap(), 1.0);
}

#[test]
fn aborted_demand_aborts_request() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.failing.insert("broken".to_string());
    let failing = Behaviour::sequence(
        "failing",
        vec![(
            "both",
            ActionKind::InternalAction {
                demands: vec![
                    ParametricDemand::new("CPU", Expr::int(5)),
                    ParametricDemand::new("broken", Expr::int(1)),
                ],
                infrastructure_calls: Vec::new(),
            },
        )],
    );
    let fine = single("fine", "CPU", 1.0);

    let failed = driver.start(&mut engine, &failing);
    let ok = driver.start(&mut engine, &fine);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.aborted.len(), 1);
    assert_eq!(driver.aborted[0].1, failed);
    assert!(driver.aborted[0].2.contains("resource failed"));
    // The CPU demand of the aborted request completing later is ignored
    assert_eq!(driver.finished.len(), 1);
    assert_relative_eq!(driver.finish_time(ok).unwrap(), 1.0);
    assert_eq!(driver.coordinator.num_pending_joins(), 0);
}

#[test]
fn permits_granted_to_aborted_request_are_returned() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.failing.insert("broken".to_string());
    let behaviour = Behaviour::sequence(
        "fork",
        vec![(
            "fork",
            ActionKind::Fork {
                synchronised: vec![
                    single("fails", "broken", 1.0),
                    Behaviour::sequence("locks", vec![("lock", ActionKind::acquire("pool", 3))]),
                ],
            },
        )],
    );

    driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.aborted.len(), 1);
    assert_eq!(driver.releases.len(), 1);
    assert_eq!(driver.releases[0].1.amount, 3);
}

#[test]
fn permits_held_by_aborted_request_are_returned() {
    let (mut engine, mut driver) = setup(file!(), 1);
    driver.failing.insert("broken".to_string());
    let behaviour = Behaviour::sequence(
        "leaky",
        vec![
            ("lock", ActionKind::acquire("pool", 2)),
            ("other lock", ActionKind::acquire("pool", 1)),
            ("unlock one", ActionKind::release("pool", 1)),
            ("work", work("broken", 1.0)),
        ],
    );

    let request = driver.start(&mut engine, &behaviour);
    engine.run(&mut driver).unwrap();

    assert_eq!(driver.aborted.len(), 1);
    assert_eq!(driver.aborted[0].1, request);
    // One release by the behaviour itself, one for the 2 permits still held
    let amounts: Vec<u64> = driver.releases.iter().map(|(_, r)| r.amount).collect();
    assert_eq!(amounts, vec![1, 2]);
    assert_eq!(driver.releases[1].1.semaphore.as_str(), "pool");
}
