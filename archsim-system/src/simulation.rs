// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The complete simulation: workload, behaviour interpretation and
//! resources wired together behind a single [`Handler`].
//!
//! Interpretation outputs are routed here: demands and releases go to the
//! resources, calls are looked up in the [`Repository`] and started in the
//! providing usage context. When the caller and the callee are deployed on
//! different nodes the call first travels over the network as a message of
//! `message_bytes` and only starts once the message has arrived. A lost
//! message aborts the calling request.
//!
//! Resource outcomes are fed back to the interpretation coordinator and the
//! end of every request is recorded.

use std::collections::HashMap;
use std::sync::Arc;

use archsim_behaviour::context::RequestId;
use archsim_behaviour::coordinator::InterpretationCoordinator;
use archsim_behaviour::events::InterpretationEvent;
use archsim_behaviour::interpretation::CallRequest;
use archsim_engine::events::Scheduled;
use archsim_engine::sim_error;
use archsim_engine::traits::Handler;
use archsim_engine::types::SimError;
use archsim_model::behaviour::Behaviour;
use archsim_model::expr::Bindings;
use archsim_model::ids::AssemblyContextId;
use archsim_model::request::RequesterId;
use archsim_model::topology::Topology;
use archsim_resources::events::ResourceEvent;
use archsim_resources::job::{CallId, NetworkCall};
use archsim_resources::simulation::ResourceSimulation;
use archsim_track::entity::Entity;
use archsim_track::{debug, info, trace, warn};

use crate::events::{SimEvent, UsageEvent, from_interpretation, from_resources};
use crate::repository::{ProvidedOperation, Repository};
use crate::workload::{Arrivals, Workload};

/// Size of the message sent between nodes for every remote call.
pub const DEFAULT_MESSAGE_BYTES: f64 = 1024.0;

type Events = Vec<Scheduled<SimEvent>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed,
    Aborted(String),
}

/// The life of one request issued by the workload (or directly).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub request: RequestId,
    pub start: f64,
    pub end: f64,
    pub outcome: Outcome,
}

impl RequestRecord {
    #[must_use]
    pub fn response_time(&self) -> f64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == Outcome::Completed
    }
}

struct InProgress {
    start: f64,
    user: Option<usize>,
}

pub struct Simulation {
    pub entity: Arc<Entity>,
    repository: Repository,
    resources: ResourceSimulation,
    interpretation: InterpretationCoordinator,
    workload: Option<Workload>,
    message_bytes: f64,

    /// Calls whose message is still travelling between nodes.
    remote_calls: HashMap<CallId, (CallRequest, ProvidedOperation)>,
    next_call: u64,

    in_progress: HashMap<RequestId, InProgress>,
    records: Vec<RequestRecord>,
}

impl Simulation {
    #[must_use]
    pub fn new(
        parent: &Arc<Entity>,
        topology: &Topology,
        repository: Repository,
        seed: u64,
    ) -> Self {
        let entity = Arc::new(Entity::new(parent, "system"));
        Self {
            resources: ResourceSimulation::new(&entity, topology, seed),
            interpretation: InterpretationCoordinator::new(&entity, seed.wrapping_add(1)),
            entity,
            repository,
            workload: None,
            message_bytes: DEFAULT_MESSAGE_BYTES,
            remote_calls: HashMap::new(),
            next_call: 0,
            in_progress: HashMap::new(),
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_workload(mut self, workload: Workload) -> Self {
        self.workload = Some(workload);
        self
    }

    #[must_use]
    pub fn with_message_bytes(mut self, message_bytes: f64) -> Self {
        self.message_bytes = message_bytes;
        self
    }

    pub fn set_link_failure_probability(&mut self, failure_probability: f64) {
        self.resources
            .set_link_failure_probability(failure_probability);
    }

    /// The events that start the workload.
    #[must_use]
    pub fn start(&self) -> Events {
        let Some(workload) = &self.workload else {
            return Vec::new();
        };
        match workload.arrivals {
            Arrivals::Closed { population, .. } => (0..population)
                .map(|user| Scheduled::now(SimEvent::Usage(UsageEvent::UserReady(user))))
                .collect(),
            Arrivals::Open { .. } => vec![Scheduled::now(SimEvent::Usage(UsageEvent::Arrival))],
        }
    }

    /// Issue a single request outside of any workload.
    pub fn issue_request(
        &mut self,
        now: f64,
        behaviour: &Arc<Behaviour>,
        assembly: &str,
        bindings: Bindings,
    ) -> (RequestId, Events) {
        self.issue(now, behaviour, AssemblyContextId::new(assembly), bindings, None)
    }

    #[must_use]
    pub fn records(&self) -> &[RequestRecord] {
        &self.records
    }

    #[must_use]
    pub fn record_of(&self, request: RequestId) -> Option<&RequestRecord> {
        self.records.iter().find(|record| record.request == request)
    }

    #[must_use]
    pub fn num_completed(&self) -> usize {
        self.records.iter().filter(|r| r.is_completed()).count()
    }

    #[must_use]
    pub fn num_aborted(&self) -> usize {
        self.records.len() - self.num_completed()
    }

    #[must_use]
    pub fn num_in_progress(&self) -> usize {
        self.in_progress.len()
    }

    /// Mean response time of the completed requests.
    #[must_use]
    pub fn mean_response_time(&self) -> Option<f64> {
        let completed: Vec<f64> = self
            .records
            .iter()
            .filter(|r| r.is_completed())
            .map(RequestRecord::response_time)
            .collect();
        if completed.is_empty() {
            None
        } else {
            Some(completed.iter().sum::<f64>() / completed.len() as f64)
        }
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceSimulation {
        &self.resources
    }

    #[must_use]
    pub fn interpretation(&self) -> &InterpretationCoordinator {
        &self.interpretation
    }

    #[must_use]
    pub fn num_remote_calls(&self) -> usize {
        self.remote_calls.len()
    }

    fn issue(
        &mut self,
        now: f64,
        behaviour: &Arc<Behaviour>,
        assembly: AssemblyContextId,
        bindings: Bindings,
        user: Option<usize>,
    ) -> (RequestId, Events) {
        let (request, events) = self
            .interpretation
            .start_request(behaviour, assembly, bindings);
        self.in_progress
            .insert(request, InProgress { start: now, user });
        (request, from_interpretation(events))
    }

    fn on_usage(&mut self, now: f64, event: UsageEvent) -> Result<Events, SimError> {
        let Some(workload) = &self.workload else {
            return sim_error!(format!("{event:?} without a workload"));
        };
        let behaviour = workload.behaviour.clone();
        let assembly = workload.assembly.clone();
        let bindings = workload.bindings();
        let arrivals = workload.arrivals;

        match event {
            UsageEvent::UserReady(user) => {
                let (request, events) = self.issue(now, &behaviour, assembly, bindings, Some(user));
                trace!(self.entity ; "user {} issued {}", user, request);
                Ok(events)
            }
            UsageEvent::Arrival => {
                let Arrivals::Open { inter_arrival } = arrivals else {
                    return sim_error!("Arrival event in a closed workload");
                };
                let (request, mut events) = self.issue(now, &behaviour, assembly, bindings, None);
                trace!(self.entity ; "{} arrived", request);
                events.push(Scheduled::after(
                    SimEvent::Usage(UsageEvent::Arrival),
                    inter_arrival,
                ));
                Ok(events)
            }
        }
    }

    fn on_request_ended(&mut self, now: f64, request: RequestId, outcome: Outcome) -> Events {
        let Some(in_progress) = self.in_progress.remove(&request) else {
            warn!(self.entity ; "end of unknown {}", request);
            return Vec::new();
        };
        match &outcome {
            Outcome::Completed => {
                debug!(self.entity ; "{} completed after {:.3}", request, now - in_progress.start);
            }
            Outcome::Aborted(reason) => {
                info!(self.entity ; "{} aborted: {}", request, reason);
            }
        }
        self.records.push(RequestRecord {
            request,
            start: in_progress.start,
            end: now,
            outcome,
        });

        match (in_progress.user, self.workload.as_ref().map(|w| w.arrivals)) {
            (Some(user), Some(Arrivals::Closed { think_time, .. })) => vec![Scheduled::after(
                SimEvent::Usage(UsageEvent::UserReady(user)),
                think_time,
            )],
            _ => Vec::new(),
        }
    }

    fn route_call(&mut self, call: CallRequest) -> Events {
        let Some(operation) = self.repository.lookup(&call.role, &call.signature).cloned() else {
            let events = self.interpretation.fail_call(&call, "no provider");
            return from_interpretation(events);
        };

        let from = self.resources.node_of(&call.caller.request.assembly).cloned();
        let to = self.resources.node_of(&operation.assembly).cloned();
        match (from, to) {
            (Some(from), Some(to)) if from != to => {
                let id = CallId(self.next_call);
                self.next_call += 1;
                let message = NetworkCall {
                    id,
                    from,
                    to,
                    bytes: self.message_bytes,
                    requester: RequesterId(call.request().0),
                };
                trace!(self.entity ; "{} sent as {}", call, message);
                self.remote_calls.insert(id, (call, operation));
                vec![Scheduled::now(SimEvent::Resource(
                    ResourceEvent::NetworkCallRequested(message),
                ))]
            }
            _ => {
                let events =
                    self.interpretation
                        .start_call(call, &operation.behaviour, operation.assembly);
                from_interpretation(events)
            }
        }
    }

    fn on_interpretation_output(
        &mut self,
        now: f64,
        event: InterpretationEvent,
    ) -> Result<Events, SimError> {
        let events = match event {
            InterpretationEvent::ResourceDemandRequested(request) => vec![Scheduled::now(
                SimEvent::Resource(ResourceEvent::DemandRequested(request)),
            )],
            InterpretationEvent::PassiveReleaseRequested(release) => vec![Scheduled::now(
                SimEvent::Resource(ResourceEvent::PassiveReleaseRequested(release)),
            )],
            InterpretationEvent::ExternalCallRequested(call)
            | InterpretationEvent::InfrastructureCallRequested(call) => self.route_call(call),
            InterpretationEvent::RequestFinished { request } => {
                self.on_request_ended(now, request, Outcome::Completed)
            }
            InterpretationEvent::RequestAborted { request, reason } => {
                self.on_request_ended(now, request, Outcome::Aborted(reason))
            }
            internal => {
                return sim_error!(format!("Internal event {internal:?} routed as output"));
            }
        };
        Ok(events)
    }

    fn on_resource_output(&mut self, event: ResourceEvent) -> Result<Events, SimError> {
        let events = match event {
            ResourceEvent::ResourceDemandSatisfied(request) => {
                self.interpretation.on_demand_satisfied(&request)
            }
            ResourceEvent::ResourceDemandAborted { request, reason } => {
                self.interpretation.on_demand_aborted(&request, &reason)
            }
            ResourceEvent::PassiveResourceAcquired(granted) => {
                self.interpretation.on_demand_satisfied(&granted.request)
            }
            ResourceEvent::NetworkCallSucceeded(message) => {
                match self.remote_calls.remove(&message.id) {
                    Some((call, operation)) => self.interpretation.start_call(
                        call,
                        &operation.behaviour,
                        operation.assembly,
                    ),
                    None => {
                        warn!(self.entity ; "unknown {} delivered", message);
                        Vec::new()
                    }
                }
            }
            ResourceEvent::NetworkCallAborted { call: message, reason } => {
                match self.remote_calls.remove(&message.id) {
                    Some((call, _)) => self.interpretation.fail_call(&call, &reason),
                    None => {
                        warn!(self.entity ; "unknown {} lost: {}", message, reason);
                        Vec::new()
                    }
                }
            }
            ResourceEvent::PassiveResourceReleased(release) => {
                trace!(self.entity ; "{} x {} released by {}", release.amount, release.semaphore, release.requester);
                Vec::new()
            }
            ResourceEvent::PassiveResourceStateUpdated { key, available } => {
                trace!(self.entity ; "{} has {} permits", key, available);
                Vec::new()
            }
            ResourceEvent::ActiveResourceStateUpdated {
                target,
                queue_length,
            } => {
                trace!(self.entity ; "{} queue length {}", target, queue_length);
                Vec::new()
            }
            other => {
                return sim_error!(format!("Resource event {other:?} routed as output"));
            }
        };
        Ok(from_interpretation(events))
    }
}

impl Handler<SimEvent> for Simulation {
    fn handle(&mut self, now: f64, event: SimEvent) -> Result<Events, SimError> {
        match event {
            SimEvent::Usage(event) => self.on_usage(now, event),
            SimEvent::Interpretation(event) if event.is_output() => {
                self.on_interpretation_output(now, event)
            }
            SimEvent::Interpretation(event) => {
                Ok(from_interpretation(self.interpretation.handle(now, event)?))
            }
            SimEvent::Resource(event) if event.is_output() => self.on_resource_output(event),
            SimEvent::Resource(event) => Ok(from_resources(self.resources.handle(now, event)?)),
        }
    }
}
