// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This module represents the time during a simulation.
//!
//! Time is a non-negative real number in abstract simulation units. The
//! simulated models decide what a unit means (typically seconds).

use std::sync::Arc;

use archsim_track::entity::Entity;
use archsim_track::set_time;

/// Tolerance used when deciding whether a remaining demand or a time
/// difference is zero.
pub const EPSILON: f64 = 1e-9;

/// Returns true if `value`, derived from times around `now`, is zero to
/// within the rounding error of `now`.
///
/// The tolerance is never smaller than [`EPSILON`] and grows with the
/// magnitude of `now`.
#[must_use]
pub fn approx_zero_at(value: f64, now: f64) -> bool {
    let tolerance = EPSILON.max(now.abs() * 64.0 * f64::EPSILON);
    value.abs() < tolerance
}

/// The overall owner of time within a simulation.
#[derive(Clone)]
pub struct SimTime {
    pub entity: Arc<Entity>,

    current: f64,
}

impl SimTime {
    #[must_use]
    pub fn new(parent: &Arc<Entity>) -> Self {
        Self {
            entity: Arc::new(Entity::new(parent, "time")),
            current: 0.0,
        }
    }

    /// Move time forward. Time never moves backwards.
    pub fn advance_to(&mut self, time: f64) {
        if time > self.current {
            set_time!(self.entity ; time);
            self.current = time;
        }
    }

    #[must_use]
    pub fn now(&self) -> f64 {
        self.current
    }
}
