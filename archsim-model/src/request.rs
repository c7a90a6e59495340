// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Requests exchanged between behaviour interpretation and the resource
//! simulation.

use std::fmt;

use crate::expr::{Bindings, Expr};
use crate::ids::{AssemblyContextId, ResourceTypeId, SemaphoreId};

/// Identity of a single resource demand request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DemandId(pub u64);

/// Opaque identity of whoever waits for the outcome of a demand. The
/// resource simulation only echoes it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequesterId(pub u64);

impl fmt::Display for DemandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "demand{}", self.0)
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requester{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Demand {
    /// An amount of processing on an active resource. The amount is
    /// evaluated against the request bindings when the demand is admitted.
    Active {
        resource_type: ResourceTypeId,
        amount: Expr,
    },
    /// A number of permits of a semaphore.
    Passive { semaphore: SemaphoreId, amount: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDemandRequest {
    pub id: DemandId,
    pub requester: RequesterId,
    pub assembly: AssemblyContextId,
    pub demand: Demand,
    pub bindings: Bindings,
}

impl fmt::Display for ResourceDemandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.demand {
            Demand::Active { resource_type, .. } => {
                write!(f, "{} ({resource_type}@{})", self.id, self.assembly)
            }
            Demand::Passive { semaphore, amount } => {
                write!(f, "{} ({amount} x {semaphore}@{})", self.id, self.assembly)
            }
        }
    }
}

/// Return permits of a semaphore owned by `assembly`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveRelease {
    pub requester: RequesterId,
    pub assembly: AssemblyContextId,
    pub semaphore: SemaphoreId,
    pub amount: u64,
}
