// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The system and usage layer of archsim.
//!
//! This crate wires the [behaviour interpretation](archsim_behaviour) and the
//! [resource simulation](archsim_resources) together:
//!
//!  - a [`Repository`](crate::repository::Repository) of the operations each
//!    usage context provides,
//!  - [workloads](crate::workload) that issue requests,
//!  - the [`Simulation`](crate::simulation::Simulation) handler that routes
//!    every event and records the outcome of each request,
//!  - builders for the [demo model](crate::model_builder) and the
//!    [tracker](crate::tracker_builder) used by the `archsim` binary.
//!
//! # Example
//!
//! ```
//! use archsim_engine::engine::Engine;
//! use archsim_system::model_builder::build_three_tier;
//! use archsim_system::simulation::Simulation;
//! use archsim_track::tracker::dev_null_tracker;
//!
//! let system = build_three_tier(2, 1.0, 0.0).unwrap();
//! let mut engine = Engine::new(&dev_null_tracker());
//! let mut simulation = Simulation::new(engine.top(), &system.topology, system.repository, 1)
//!     .with_workload(system.workload);
//! engine.schedule_all(simulation.start()).unwrap();
//! engine.run_until(&mut simulation, 100.0).unwrap();
//! assert!(simulation.num_completed() > 0);
//! ```

pub mod events;
pub mod model_builder;
pub mod repository;
pub mod simulation;
pub mod tracker_builder;
pub mod workload;
