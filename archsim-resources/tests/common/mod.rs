// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![allow(dead_code)]

use archsim_engine::engine::Engine;
use archsim_engine::events::Scheduled;
use archsim_engine::test_helpers::start_test;
use archsim_engine::traits::Handler;
use archsim_engine::types::SimError;
use archsim_model::expr::{Bindings, Expr};
use archsim_model::ids::{AssemblyContextId, ResourceTypeId, SemaphoreId};
use archsim_model::request::{Demand, DemandId, RequesterId, ResourceDemandRequest};
use archsim_model::topology::Topology;
use archsim_resources::events::ResourceEvent;
use archsim_resources::simulation::ResourceSimulation;

/// Forwards inputs to the resource simulation and records its outputs.
pub struct Recorder {
    pub sim: ResourceSimulation,
    pub outputs: Vec<(f64, ResourceEvent)>,
}

impl Handler<ResourceEvent> for Recorder {
    fn handle(
        &mut self,
        now: f64,
        event: ResourceEvent,
    ) -> Result<Vec<Scheduled<ResourceEvent>>, SimError> {
        if event.is_output() {
            self.outputs.push((now, event));
            Ok(Vec::new())
        } else {
            self.sim.handle(now, event)
        }
    }
}

impl Recorder {
    /// Times at which each demand was satisfied, in order.
    pub fn satisfied(&self) -> Vec<(DemandId, f64)> {
        self.outputs
            .iter()
            .filter_map(|(time, event)| match event {
                ResourceEvent::ResourceDemandSatisfied(request) => Some((request.id, *time)),
                _ => None,
            })
            .collect()
    }

    pub fn aborted(&self) -> Vec<(DemandId, String)> {
        self.outputs
            .iter()
            .filter_map(|(_, event)| match event {
                ResourceEvent::ResourceDemandAborted { request, reason } => {
                    Some((request.id, reason.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn acquired(&self) -> Vec<(DemandId, f64)> {
        self.outputs
            .iter()
            .filter_map(|(time, event)| match event {
                ResourceEvent::PassiveResourceAcquired(job) => Some((job.request.id, *time)),
                _ => None,
            })
            .collect()
    }
}

pub fn setup(file: &str, topology: &Topology, seed: u64) -> (Engine<ResourceEvent>, Recorder) {
    let engine = start_test(file);
    let sim = ResourceSimulation::new(engine.top(), topology, seed);
    (
        engine,
        Recorder {
            sim,
            outputs: Vec::new(),
        },
    )
}

pub fn active_request(id: u64, resource_type: &str, amount: f64) -> ResourceDemandRequest {
    ResourceDemandRequest {
        id: DemandId(id),
        requester: RequesterId(id),
        assembly: AssemblyContextId::new("ctx"),
        demand: Demand::Active {
            resource_type: ResourceTypeId::new(resource_type),
            amount: Expr::double(amount),
        },
        bindings: Bindings::new(),
    }
}

pub fn passive_request(id: u64, semaphore: &str, amount: u64) -> ResourceDemandRequest {
    ResourceDemandRequest {
        id: DemandId(id),
        requester: RequesterId(id),
        assembly: AssemblyContextId::new("ctx"),
        demand: Demand::Passive {
            semaphore: SemaphoreId::new(semaphore),
            amount,
        },
        bindings: Bindings::new(),
    }
}
