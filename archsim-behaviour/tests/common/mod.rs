// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use archsim_behaviour::context::RequestId;
use archsim_behaviour::coordinator::InterpretationCoordinator;
use archsim_behaviour::events::InterpretationEvent;
use archsim_behaviour::interpretation::CallRequest;
use archsim_engine::engine::Engine;
use archsim_engine::events::Scheduled;
use archsim_engine::test_helpers::start_test;
use archsim_engine::traits::Handler;
use archsim_engine::types::SimError;
use archsim_model::behaviour::Behaviour;
use archsim_model::expr::{Bindings, Evaluate, ExprEvaluator};
use archsim_model::ids::AssemblyContextId;
use archsim_model::request::{Demand, PassiveRelease, ResourceDemandRequest};

#[derive(Debug)]
pub enum TestEvent {
    Interpretation(InterpretationEvent),
    Satisfied(ResourceDemandRequest),
    Aborted(ResourceDemandRequest),
}

fn wrap(events: Vec<Scheduled<InterpretationEvent>>) -> Vec<Scheduled<TestEvent>> {
    events
        .into_iter()
        .map(|scheduled| scheduled.map(TestEvent::Interpretation))
        .collect()
}

/// Stands in for the resources and the system around the coordinator.
///
/// Active demands are satisfied after their amount, without contention.
/// Passive demands are granted immediately. Demands of a resource type in
/// `failing` are aborted.
pub struct Driver {
    pub coordinator: InterpretationCoordinator,
    pub operations: HashMap<(String, String), Arc<Behaviour>>,
    pub failing: HashSet<String>,

    pub demands: Vec<(f64, ResourceDemandRequest)>,
    pub releases: Vec<(f64, PassiveRelease)>,
    pub calls: Vec<(f64, CallRequest)>,
    pub finished: Vec<(f64, RequestId)>,
    pub aborted: Vec<(f64, RequestId, String)>,
}

impl Driver {
    pub fn provide(&mut self, role: &str, signature: &str, behaviour: Arc<Behaviour>) {
        self.operations
            .insert((role.to_string(), signature.to_string()), behaviour);
    }

    pub fn start(&mut self, engine: &mut Engine<TestEvent>, behaviour: &Arc<Behaviour>) -> RequestId {
        self.start_with(engine, behaviour, Bindings::new())
    }

    pub fn start_with(
        &mut self,
        engine: &mut Engine<TestEvent>,
        behaviour: &Arc<Behaviour>,
        bindings: Bindings,
    ) -> RequestId {
        let (request, events) =
            self.coordinator
                .start_request(behaviour, AssemblyContextId::new("ctx"), bindings);
        engine.schedule_all(wrap(events)).unwrap();
        request
    }

    /// Resource types of all requested active demands, in request order.
    pub fn demanded_types(&self) -> Vec<String> {
        self.demands
            .iter()
            .filter_map(|(_, request)| match &request.demand {
                Demand::Active { resource_type, .. } => Some(resource_type.to_string()),
                Demand::Passive { .. } => None,
            })
            .collect()
    }

    pub fn finish_time(&self, request: RequestId) -> Option<f64> {
        self.finished
            .iter()
            .find(|(_, id)| *id == request)
            .map(|(time, _)| *time)
    }

    fn on_output(&mut self, now: f64, event: InterpretationEvent) -> Vec<Scheduled<TestEvent>> {
        match event {
            InterpretationEvent::ResourceDemandRequested(request) => {
                self.demands.push((now, request.clone()));
                match &request.demand {
                    Demand::Active {
                        resource_type,
                        amount,
                    } => {
                        if self.failing.contains(resource_type.as_str()) {
                            vec![Scheduled::now(TestEvent::Aborted(request))]
                        } else {
                            let delay = ExprEvaluator
                                .evaluate_f64(amount, &request.bindings)
                                .unwrap();
                            vec![Scheduled::after(TestEvent::Satisfied(request), delay)]
                        }
                    }
                    Demand::Passive { .. } => vec![Scheduled::now(TestEvent::Satisfied(request))],
                }
            }
            InterpretationEvent::PassiveReleaseRequested(release) => {
                self.releases.push((now, release));
                Vec::new()
            }
            InterpretationEvent::ExternalCallRequested(call)
            | InterpretationEvent::InfrastructureCallRequested(call) => {
                self.calls.push((now, call.clone()));
                let key = (call.role.to_string(), call.signature.to_string());
                let events = match self.operations.get(&key).cloned() {
                    Some(behaviour) => {
                        let assembly = AssemblyContextId::new(call.role.as_str());
                        self.coordinator.start_call(call, &behaviour, assembly)
                    }
                    None => self.coordinator.fail_call(&call, "no provider"),
                };
                wrap(events)
            }
            InterpretationEvent::RequestFinished { request } => {
                self.finished.push((now, request));
                Vec::new()
            }
            InterpretationEvent::RequestAborted { request, reason } => {
                self.aborted.push((now, request, reason));
                Vec::new()
            }
            internal => panic!("Internal event {internal:?} treated as output"),
        }
    }
}

impl Handler<TestEvent> for Driver {
    fn handle(&mut self, now: f64, event: TestEvent) -> Result<Vec<Scheduled<TestEvent>>, SimError> {
        let events = match event {
            TestEvent::Satisfied(request) => self.coordinator.on_demand_satisfied(&request),
            TestEvent::Aborted(request) => {
                self.coordinator.on_demand_aborted(&request, "resource failed")
            }
            TestEvent::Interpretation(event) if event.is_output() => {
                return Ok(self.on_output(now, event));
            }
            TestEvent::Interpretation(event) => self.coordinator.handle(now, event)?,
        };
        Ok(wrap(events))
    }
}

pub fn setup(file: &str, seed: u64) -> (Engine<TestEvent>, Driver) {
    let engine = start_test(file);
    let coordinator = InterpretationCoordinator::new(engine.top(), seed);
    (
        engine,
        Driver {
            coordinator,
            operations: HashMap::new(),
            failing: HashSet::new(),
            demands: Vec::new(),
            releases: Vec::new(),
            calls: Vec::new(),
            finished: Vec::new(),
            aborted: Vec::new(),
        },
    )
}
