// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Events produced and consumed while interpreting behaviours.

use archsim_model::ids::ActionId;
use archsim_model::request::{Demand, PassiveRelease, ResourceDemandRequest};

use crate::context::{InfrastructureCallSpec, RequestId};
use crate::interpretation::{CallRequest, InterpretationContext};

#[derive(Debug, Clone)]
pub enum InterpretationEvent {
    /// The current action of the scope is done: move to its successor.
    Progressed(InterpretationContext),
    /// A new child scope is ready to be interpreted from its `Start` action.
    ChildStarted(InterpretationContext),
    /// A child scope has finished: continue the parent scope at `successor`.
    Resumed {
        context: InterpretationContext,
        successor: ActionId,
    },
    /// The scope has reached its `Stop` action.
    Finished(InterpretationContext),
    /// Issue the next call of an infrastructure segment.
    InfrastructureSegmentProgressed(InterpretationContext),
    /// The current action needs resources before it is done. Once all
    /// `demands` are satisfied any `infrastructure_calls` are run as a
    /// segment.
    DemandsRequested {
        context: InterpretationContext,
        demands: Vec<Demand>,
        infrastructure_calls: Vec<InfrastructureCallSpec>,
    },

    // Outputs
    ResourceDemandRequested(ResourceDemandRequest),
    PassiveReleaseRequested(PassiveRelease),
    ExternalCallRequested(CallRequest),
    InfrastructureCallRequested(CallRequest),
    RequestFinished {
        request: RequestId,
    },
    RequestAborted {
        request: RequestId,
        reason: String,
    },
}

impl InterpretationEvent {
    /// Whether the event is addressed to the layers around the interpreter
    /// rather than to the interpretation coordinator.
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            InterpretationEvent::ResourceDemandRequested(_)
                | InterpretationEvent::PassiveReleaseRequested(_)
                | InterpretationEvent::ExternalCallRequested(_)
                | InterpretationEvent::InfrastructureCallRequested(_)
                | InterpretationEvent::RequestFinished { .. }
                | InterpretationEvent::RequestAborted { .. }
        )
    }

    /// The request an internal event belongs to.
    #[must_use]
    pub fn request(&self) -> Option<RequestId> {
        match self {
            InterpretationEvent::Progressed(context)
            | InterpretationEvent::ChildStarted(context)
            | InterpretationEvent::Resumed { context, .. }
            | InterpretationEvent::Finished(context)
            | InterpretationEvent::InfrastructureSegmentProgressed(context)
            | InterpretationEvent::DemandsRequested { context, .. } => Some(context.id()),
            InterpretationEvent::ExternalCallRequested(call)
            | InterpretationEvent::InfrastructureCallRequested(call) => Some(call.request()),
            InterpretationEvent::RequestFinished { request }
            | InterpretationEvent::RequestAborted { request, .. } => Some(*request),
            InterpretationEvent::ResourceDemandRequested(_)
            | InterpretationEvent::PassiveReleaseRequested(_) => None,
        }
    }
}
