// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The deployment topology: nodes with their active resources, the
//! allocation of usage contexts (and their semaphores) to nodes, and the
//! network links between nodes.

use std::collections::BTreeSet;

use archsim_engine::sim_error;
use archsim_engine::types::SimError;
use rand::RngCore;

use crate::ids::{AssemblyContextId, LinkId, NodeId, ResourceTypeId, SemaphoreId};

/// Return a uniformly distributed value in `[0, 1)`.
pub fn unit_interval(rng: &mut dyn RngCore) -> f64 {
    rng.next_u32() as f64 / (u32::MAX as f64 + 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// First-come-first-served, one job in service at a time.
    Fcfs,
    /// Processor sharing over `capacity` cores.
    ProcessorSharing,
    /// Infinite server: every job is delayed by its own demand.
    Delay,
}

/// An active resource deployed on a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveResourceSpec {
    pub resource_type: ResourceTypeId,
    pub policy: SchedulingPolicy,
    pub capacity: usize,
    /// Demand units processed per unit of simulated time.
    pub processing_rate: f64,
}

impl ActiveResourceSpec {
    pub fn new(
        resource_type: &str,
        policy: SchedulingPolicy,
        capacity: usize,
        processing_rate: f64,
    ) -> Result<Self, SimError> {
        if capacity == 0 {
            return sim_error!(format!("Resource {resource_type} needs a capacity of at least 1"));
        }
        if processing_rate.is_nan() || processing_rate <= 0.0 {
            return sim_error!(format!(
                "Resource {resource_type} has invalid processing rate {processing_rate}"
            ));
        }
        Ok(Self {
            resource_type: ResourceTypeId::new(resource_type),
            policy,
            capacity,
            processing_rate,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentNode {
    pub id: NodeId,
    pub resources: Vec<ActiveResourceSpec>,
}

impl DeploymentNode {
    #[must_use]
    pub fn new(id: &str, resources: Vec<ActiveResourceSpec>) -> Self {
        Self {
            id: NodeId::new(id),
            resources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreSpec {
    pub id: SemaphoreId,
    pub capacity: u64,
}

impl SemaphoreSpec {
    #[must_use]
    pub fn new(id: &str, capacity: u64) -> Self {
        Self {
            id: SemaphoreId::new(id),
            capacity,
        }
    }
}

/// Placement of a usage context on a node, with the semaphores the usage
/// context owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub context: AssemblyContextId,
    pub node: NodeId,
    pub semaphores: Vec<SemaphoreSpec>,
}

impl Allocation {
    #[must_use]
    pub fn new(context: &str, node: &str, semaphores: Vec<SemaphoreSpec>) -> Self {
        Self {
            context: AssemblyContextId::new(context),
            node: NodeId::new(node),
            semaphores,
        }
    }
}

/// Latency added by a link to every message it carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Latency {
    Fixed(f64),
    Uniform { low: f64, high: f64 },
    Exponential { mean: f64 },
}

impl Latency {
    /// Draw a latency value.
    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        match *self {
            Latency::Fixed(latency) => latency,
            Latency::Uniform { low, high } => low + unit_interval(rng) * (high - low),
            Latency::Exponential { mean } => -mean * (1.0 - unit_interval(rng)).ln(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub id: LinkId,
    pub endpoints: BTreeSet<NodeId>,
    /// Bytes transferred per unit of simulated time.
    pub throughput: f64,
    pub latency: Latency,
    pub failure_probability: f64,
}

impl LinkSpec {
    pub fn new(
        id: &str,
        endpoints: &[&str],
        throughput: f64,
        latency: Latency,
        failure_probability: f64,
    ) -> Result<Self, SimError> {
        if throughput.is_nan() || throughput <= 0.0 {
            return sim_error!(format!("Link {id} has invalid throughput {throughput}"));
        }
        if !(0.0..=1.0).contains(&failure_probability) {
            return sim_error!(format!(
                "Link {id} has invalid failure probability {failure_probability}"
            ));
        }
        Ok(Self {
            id: LinkId::new(id),
            endpoints: endpoints.iter().map(|n| NodeId::new(n)).collect(),
            throughput,
            latency,
            failure_probability,
        })
    }

    #[must_use]
    pub fn connects(&self, a: &NodeId, b: &NodeId) -> bool {
        self.endpoints.contains(a) && self.endpoints.contains(b)
    }

    #[must_use]
    pub fn touches(&self, a: &NodeId, b: &NodeId) -> bool {
        self.endpoints.contains(a) || self.endpoints.contains(b)
    }
}

/// The complete deployment at initialisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub nodes: Vec<DeploymentNode>,
    pub allocations: Vec<Allocation>,
    pub links: Vec<LinkSpec>,
}

impl Topology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(mut self, node: DeploymentNode) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocations.push(allocation);
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: LinkSpec) -> Self {
        self.links.push(link);
        self
    }

    #[must_use]
    pub fn node_of(&self, context: &AssemblyContextId) -> Option<&NodeId> {
        self.allocations
            .iter()
            .find(|a| &a.context == context)
            .map(|a| &a.node)
    }

    /// Apply a change notification to this description.
    pub fn apply(&mut self, change: &TopologyChange) {
        match change {
            TopologyChange::NodeAdded(node) => {
                self.nodes.retain(|n| n.id != node.id);
                self.nodes.push(node.clone());
            }
            TopologyChange::NodeRemoved(id) => self.nodes.retain(|n| &n.id != id),
            TopologyChange::AllocationChanged(allocation) => {
                self.allocations.retain(|a| a.context != allocation.context);
                self.allocations.push(allocation.clone());
            }
            TopologyChange::LinkAdded(link) => {
                self.links.retain(|l| l.id != link.id);
                self.links.push(link.clone());
            }
            TopologyChange::LinkRemoved(id) => self.links.retain(|l| &l.id != id),
        }
    }
}

/// Runtime change to the deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyChange {
    NodeAdded(DeploymentNode),
    NodeRemoved(NodeId),
    AllocationChanged(Allocation),
    LinkAdded(LinkSpec),
    LinkRemoved(LinkId),
}
