// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `archsim` - architecture-level performance simulation
//!
//! This library provides the pieces shared by every archsim crate:
//!
//!  - the [`SimError`](crate::types::SimError) type and
//!    [`sim_error!`](crate::sim_error) macro used for hard failures,
//!  - [simulated time](crate::time) and the tolerance used to compare it,
//!  - [`Scheduled`](crate::events::Scheduled) events returned by every
//!    [`Handler`](crate::traits::Handler),
//!  - a minimal discrete-event [`Engine`](crate::engine::Engine) which
//!    delivers those events in time order.
//!
//! The resource and behaviour simulation crates never talk to the engine
//! directly. They return the events they want delivered and leave it to the
//! kernel to deliver them, which keeps every handler a plain function of
//! (event, state).

pub mod engine;
pub mod events;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;
