// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Behaviour interpretation for archsim.
//!
//! Interpreting a request walks its behaviour graph one action at a time.
//! Nested scopes (the body picked by a branch, a loop body, the members of a
//! fork, a list of infrastructure calls) are [contexts](crate::context) held
//! in an arena. The [`Interpreter`](crate::interpreter::Interpreter) turns
//! the current action of a scope into events, and the
//! [`InterpretationCoordinator`](crate::coordinator::InterpretationCoordinator)
//! consumes them: it advances cursors, resumes parents and callers, joins
//! forks and demands, and reports when a request finishes or is aborted.
//!
//! Resource demands, releases and calls leave this crate as output
//! [events](crate::events::InterpretationEvent) for the surrounding system to
//! route. Their outcomes come back through
//! [`on_demand_satisfied`](crate::coordinator::InterpretationCoordinator::on_demand_satisfied),
//! [`on_demand_aborted`](crate::coordinator::InterpretationCoordinator::on_demand_aborted)
//! and [`start_call`](crate::coordinator::InterpretationCoordinator::start_call).

pub mod context;
pub mod coordinator;
pub mod events;
pub mod interpretation;
pub mod interpreter;
