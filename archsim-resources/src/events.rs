// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Events consumed and produced by the resource simulation.
//!
//! Inputs arrive from the behaviour interpretation or the topology source,
//! job lifecycle events circulate between the coordinator and the resources,
//! and the remaining variants are outputs for observers and the behaviour
//! interpretation.

use archsim_model::request::{PassiveRelease, ResourceDemandRequest};
use archsim_model::topology::TopologyChange;

use crate::job::{Job, JobId, JobTarget, NetworkCall, PassiveResourceCompoundKey, WaitingJob};

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    // Inputs
    DemandRequested(ResourceDemandRequest),
    PassiveReleaseRequested(PassiveRelease),
    NetworkCallRequested(NetworkCall),
    TopologyChanged(TopologyChange),

    // Job lifecycle
    JobInitiated(Job),
    JobProgressed {
        target: JobTarget,
        job: JobId,
        /// State token of processor-sharing resources.
        token: Option<u64>,
    },
    JobFinished(Job),
    JobAborted {
        job: Job,
        reason: String,
    },

    // Outputs
    ResourceDemandSatisfied(ResourceDemandRequest),
    ResourceDemandAborted {
        request: ResourceDemandRequest,
        reason: String,
    },
    NetworkCallSucceeded(NetworkCall),
    NetworkCallAborted {
        call: NetworkCall,
        reason: String,
    },
    PassiveResourceAcquired(WaitingJob),
    PassiveResourceReleased(PassiveRelease),
    PassiveResourceStateUpdated {
        key: PassiveResourceCompoundKey,
        available: u64,
    },
    ActiveResourceStateUpdated {
        target: JobTarget,
        queue_length: usize,
    },
}

impl ResourceEvent {
    /// True for the events the resource simulation emits for others.
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            ResourceEvent::ResourceDemandSatisfied(_)
                | ResourceEvent::ResourceDemandAborted { .. }
                | ResourceEvent::NetworkCallSucceeded(_)
                | ResourceEvent::NetworkCallAborted { .. }
                | ResourceEvent::PassiveResourceAcquired(_)
                | ResourceEvent::PassiveResourceReleased(_)
                | ResourceEvent::PassiveResourceStateUpdated { .. }
                | ResourceEvent::ActiveResourceStateUpdated { .. }
        )
    }
}
