// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use archsim_engine::engine::Engine;
use archsim_engine::test_helpers::create_tracker;
use archsim_system::events::SimEvent;
use archsim_system::model_builder::build_three_tier;
use archsim_system::simulation::{RequestRecord, Simulation};
use archsim_track::Tracker;
use archsim_track::tracker::{EntityManager, InMemoryTracker};

fn run(file: &str, num_users: usize, link_failure_probability: f64, seed: u64) -> Simulation {
    run_with_tracker(&create_tracker(file), num_users, link_failure_probability, seed)
}

fn run_with_tracker(
    tracker: &Tracker,
    num_users: usize,
    link_failure_probability: f64,
    seed: u64,
) -> Simulation {
    let system = build_three_tier(num_users, 1.0, link_failure_probability).unwrap();
    let mut engine: Engine<SimEvent> = Engine::new(tracker);
    let mut simulation = Simulation::new(engine.top(), &system.topology, system.repository, seed)
        .with_workload(system.workload);
    engine.schedule_all(simulation.start()).unwrap();
    engine.run_until(&mut simulation, 200.0).unwrap();
    simulation
}

#[test]
fn reliable_network_completes_every_request() {
    let simulation = run(file!(), 4, 0.0, 1);

    assert!(simulation.num_completed() > 0);
    assert_eq!(simulation.num_aborted(), 0);
    // Every user has at most one request in progress
    assert!(simulation.num_in_progress() <= 4);
    assert!(simulation.mean_response_time().unwrap() > 0.0);
}

#[test]
fn broken_network_aborts_every_request() {
    let simulation = run(file!(), 4, 1.0, 1);

    assert_eq!(simulation.num_completed(), 0);
    assert!(simulation.num_aborted() > 0);
    assert!(simulation.mean_response_time().is_none());
}

#[test]
fn runs_are_reproducible() {
    let first: Vec<RequestRecord> = run(file!(), 3, 0.1, 7).records().to_vec();
    let second: Vec<RequestRecord> = run(file!(), 3, 0.1, 7).records().to_vec();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn every_completed_request_reads_the_disk() {
    let mut manager = EntityManager::new(log::Level::Warn);
    manager.add_log_filter(".*storage_HDD", log::Level::Trace).unwrap();
    let in_memory = std::sync::Arc::new(InMemoryTracker::new(manager));
    let tracker: Tracker = in_memory.clone();

    let simulation = run_with_tracker(&tracker, 2, 0.0, 3);

    let disk = in_memory
        .tag_for_name("top::system::resources::active::storage_HDD")
        .unwrap();
    // Each request queries the database at least once for its audit
    assert!(in_memory.count_enter(disk) >= simulation.num_completed());
    assert!(in_memory.count_exit(disk) <= in_memory.count_enter(disk));
}
