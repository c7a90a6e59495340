// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Work in flight against resources.

use std::fmt;

use archsim_model::ids::{AssemblyContextId, LinkId, NodeId, ResourceTypeId, SemaphoreId};
use archsim_model::request::{RequesterId, ResourceDemandRequest};
use archsim_track::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job{}", self.0)
    }
}

/// Identity of an active resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActiveResourceCompoundKey {
    pub node: NodeId,
    pub resource_type: ResourceTypeId,
}

impl ActiveResourceCompoundKey {
    #[must_use]
    pub fn new(node: &NodeId, resource_type: &ResourceTypeId) -> Self {
        Self {
            node: node.clone(),
            resource_type: resource_type.clone(),
        }
    }
}

impl fmt::Display for ActiveResourceCompoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource_type, self.node)
    }
}

/// Identity of a semaphore instance: one per semaphore definition and usage
/// context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassiveResourceCompoundKey {
    pub semaphore: SemaphoreId,
    pub context: AssemblyContextId,
}

impl PassiveResourceCompoundKey {
    #[must_use]
    pub fn new(semaphore: &SemaphoreId, context: &AssemblyContextId) -> Self {
        Self {
            semaphore: semaphore.clone(),
            context: context.clone(),
        }
    }
}

impl fmt::Display for PassiveResourceCompoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.semaphore, self.context)
    }
}

/// The resource a job is served by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobTarget {
    Active(ActiveResourceCompoundKey),
    Linking(LinkId),
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobTarget::Active(key) => write!(f, "{key}"),
            JobTarget::Linking(link) => write!(f, "link {link}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

/// A message sent over the network between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkCall {
    pub id: CallId,
    pub from: NodeId,
    pub to: NodeId,
    pub bytes: f64,
    pub requester: RequesterId,
}

impl fmt::Display for NetworkCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call{} {}->{}", self.id.0, self.from, self.to)
    }
}

/// What caused a job to exist.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOrigin {
    Demand(ResourceDemandRequest),
    Call(NetworkCall),
}

/// Work in flight against an active or linking resource.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Remaining demand in simulated time units.
    pub demand: f64,
    pub target: JobTarget,
    pub origin: JobOrigin,
    pub tag: Tag,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl std::hash::Hash for Job {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.id, self.target)
    }
}

/// A request for semaphore permits.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingJob {
    pub request: ResourceDemandRequest,
    pub key: PassiveResourceCompoundKey,
    pub demand: u64,
}

impl fmt::Display for WaitingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} for {}", self.demand, self.key, self.request.id)
    }
}
