// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Events handled by the [`Simulation`](crate::simulation::Simulation).

use archsim_behaviour::events::InterpretationEvent;
use archsim_engine::events::Scheduled;
use archsim_resources::events::ResourceEvent;

/// Events produced by the workload.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageEvent {
    /// A user of the closed workload has finished thinking.
    UserReady(usize),
    /// The next request of the open workload arrives.
    Arrival,
}

#[derive(Debug, Clone)]
pub enum SimEvent {
    Interpretation(InterpretationEvent),
    Resource(ResourceEvent),
    Usage(UsageEvent),
}

pub(crate) fn from_interpretation(
    events: Vec<Scheduled<InterpretationEvent>>,
) -> Vec<Scheduled<SimEvent>> {
    events
        .into_iter()
        .map(|scheduled| scheduled.map(SimEvent::Interpretation))
        .collect()
}

pub(crate) fn from_resources(events: Vec<Scheduled<ResourceEvent>>) -> Vec<Scheduled<SimEvent>> {
    events
        .into_iter()
        .map(|scheduled| scheduled.map(SimEvent::Resource))
        .collect()
}
