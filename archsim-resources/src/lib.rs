// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The resource scheduling side of archsim.
//!
//! # Active resources
//!
//! [Active resources](crate::active) process jobs according to a scheduling
//! policy:
//!
//!  - [`Fcfs`](crate::active::Fcfs): one job at a time, in arrival order.
//!  - [`ProcessorSharing`](crate::active::ProcessorSharing): all jobs share
//!    the available cores fairly.
//!  - [`Delay`](crate::active::Delay): every job is delayed by its own
//!    demand.
//!
//! # Passive resources
//!
//! [Passive resources](crate::passive) are counting semaphores with a FIFO
//! wait queue.
//!
//! # Linking resources
//!
//! [Links](crate::linking) carry network calls between nodes, adding latency
//! and losing messages with a given probability.
//!
//! # Coordination
//!
//! The [`ResourceSimulation`](crate::simulation::ResourceSimulation) owns
//! all resources and translates between requests and job lifecycle events.

pub mod active;
pub mod events;
pub mod job;
pub mod linking;
pub mod passive;
pub mod resolution;
pub mod simulation;
