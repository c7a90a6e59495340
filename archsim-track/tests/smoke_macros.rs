// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::sync::Arc;

use archsim_track::entity::{Entity, toplevel};
use archsim_track::test_helpers::check_and_clear;
use archsim_track::tracker::{EntityManager, InMemoryTracker};
use archsim_track::{Tag, Tracker, debug, enter, exit, info, test_init, trace};

#[test]
fn entity_lifecycle() {
    let (test_tracker, tracker) = test_init!(10);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &["0: created 10, top"]);

    {
        let _cpu = Entity::new(&top, "cpu");
        check_and_clear(&test_tracker, &["10: created 11, top::cpu"]);
    }
    check_and_clear(&test_tracker, &["10: destroyed 11"]);
}

#[test]
fn log_macros() {
    let (test_tracker, tracker) = test_init!(20);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &[".*created 20, top"]);

    trace!(top ; "job {} initiated", 3);
    debug!(top ; "queue length {}", 2);
    info!(top ; "done");
    check_and_clear(
        &test_tracker,
        &[
            "20:TRACE: job 3 initiated",
            "20:DEBUG: queue length 2",
            "20:INFO: done",
        ],
    );
}

#[test]
fn in_memory_enter_exit() {
    let mut manager = EntityManager::new(log::Level::Warn);
    manager.add_log_filter(".*cpu", log::Level::Trace).unwrap();
    let in_memory = Arc::new(InMemoryTracker::new(manager));
    let tracker: Tracker = in_memory.clone();

    let top = toplevel(&tracker, "top");
    let cpu = Entity::new(&top, "cpu");

    enter!(cpu ; Tag(100));
    enter!(cpu ; Tag(101));
    exit!(cpu ; Tag(100));

    // The top level is only enabled at Warn so nothing is recorded for it.
    enter!(top ; Tag(102));

    let cpu_tag = in_memory.tag_for_name("top::cpu").unwrap();
    assert_eq!(cpu_tag, cpu.tag);
    assert_eq!(in_memory.count_enter(cpu.tag), 2);
    assert_eq!(in_memory.count_exit(cpu.tag), 1);
    assert_eq!(in_memory.occupancy(cpu.tag), 1);
    assert_eq!(in_memory.count_enter(top.tag), 0);
}
