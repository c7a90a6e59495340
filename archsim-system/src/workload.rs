// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Workloads that issue requests into the system.
//!
//! A closed workload has a fixed population of users. Each user issues a
//! request, waits for it to finish (or abort), thinks for `think_time` and
//! then issues the next one. An open workload issues a new request every
//! `inter_arrival` time units regardless of how many are in progress.

use std::sync::Arc;

use archsim_engine::sim_error;
use archsim_engine::types::SimError;
use archsim_model::behaviour::Behaviour;
use archsim_model::expr::{Bindings, Value};
use archsim_model::ids::AssemblyContextId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arrivals {
    Closed { population: usize, think_time: f64 },
    Open { inter_arrival: f64 },
}

/// The usage scenario run by the system: which behaviour every request
/// interprets, where, and how often.
#[derive(Debug, Clone)]
pub struct Workload {
    pub behaviour: Arc<Behaviour>,
    pub assembly: AssemblyContextId,
    pub arrivals: Arrivals,
    inputs: Vec<(String, Value)>,
}

impl Workload {
    pub fn closed(
        behaviour: Arc<Behaviour>,
        assembly: &str,
        population: usize,
        think_time: f64,
    ) -> Result<Self, SimError> {
        if think_time.is_nan() || think_time < 0.0 {
            return sim_error!(format!("Invalid think time {think_time}"));
        }
        Ok(Self {
            behaviour,
            assembly: AssemblyContextId::new(assembly),
            arrivals: Arrivals::Closed {
                population,
                think_time,
            },
            inputs: Vec::new(),
        })
    }

    pub fn open(
        behaviour: Arc<Behaviour>,
        assembly: &str,
        inter_arrival: f64,
    ) -> Result<Self, SimError> {
        if inter_arrival.is_nan() || inter_arrival <= 0.0 {
            return sim_error!(format!("Invalid inter-arrival time {inter_arrival}"));
        }
        Ok(Self {
            behaviour,
            assembly: AssemblyContextId::new(assembly),
            arrivals: Arrivals::Open { inter_arrival },
            inputs: Vec::new(),
        })
    }

    /// Variables bound in every request issued by this workload.
    #[must_use]
    pub fn with_input(mut self, name: &str, value: Value) -> Self {
        self.inputs.push((name.to_string(), value));
        self
    }

    #[must_use]
    pub fn bindings(&self) -> Bindings {
        Bindings::new().with_frame(&self.inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_timing() {
        assert!(Workload::closed(Behaviour::empty("b"), "web", 1, -1.0).is_err());
        assert!(Workload::open(Behaviour::empty("b"), "web", 0.0).is_err());
        assert!(Workload::closed(Behaviour::empty("b"), "web", 0, 0.0).is_ok());
    }

    #[test]
    fn inputs_become_bindings() {
        let workload = Workload::open(Behaviour::empty("b"), "web", 1.0)
            .unwrap()
            .with_input("size", Value::Int(3));
        assert_eq!(workload.bindings().get("size"), Some(Value::Int(3)));
    }
}
