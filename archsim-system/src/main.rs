// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate a three-tier system under a closed workload.
//!
//! For latest usage run:
//! ```bash
//! cargo run --bin archsim -- --help
//! ```
//!
//! # Example
//!
//! Run 20 users for 500 time units with a lossy network:
//! ```bash
//! $ cargo run --bin archsim -- --num-users 20 --end-time 500 --link-failure-probability 0.01
//! ```

use archsim_config::SimConfig;
use archsim_engine::engine::Engine;
use archsim_engine::types::{SimError, SimResult};
use archsim_system::model_builder::build_three_tier;
use archsim_system::simulation::Simulation;
use archsim_system::tracker_builder::setup_tracker;
use archsim_track::{Track, info};

fn main() -> SimResult {
    let mut config = SimConfig::parse_all_sources().map_err(|e| SimError(e.to_string()))?;
    if let Some(conf_file) = config.conf_file.clone() {
        let cli = SimConfig::cli_only_from(std::env::args_os());
        config
            .parse_extra_conf_file(&conf_file, &cli)
            .map_err(|e| SimError(e.to_string()))?;
    }

    let defaults = SimConfig::default();
    let seed = config.seed.or(defaults.seed).unwrap_or_default();
    let end_time = config.end_time.or(defaults.end_time).unwrap_or_default();
    let num_users = config.num_users.or(defaults.num_users).unwrap_or_default();
    let think_time = config.think_time.or(defaults.think_time).unwrap_or_default();
    let link_failure_probability = config
        .link_failure_probability
        .or(defaults.link_failure_probability)
        .unwrap_or_default();

    let tracker = setup_tracker(&config)?;
    let mut engine = Engine::new(&tracker);

    let system = build_three_tier(num_users, think_time, link_failure_probability)?;
    let mut simulation = Simulation::new(engine.top(), &system.topology, system.repository, seed)
        .with_workload(system.workload);
    info!(engine.top() ; "{} users, think time {}, until {}", num_users, think_time, end_time);

    engine.schedule_all(simulation.start())?;
    engine.run_until(&mut simulation, end_time)?;
    tracker.shutdown();

    println!(
        "Completed {} requests, aborted {}, {} still in progress at {}",
        simulation.num_completed(),
        simulation.num_aborted(),
        simulation.num_in_progress(),
        engine.time_now()
    );
    if let Some(mean) = simulation.mean_response_time() {
        println!("Mean response time {mean:.3}");
    }
    Ok(())
}
