// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Interpretation contexts: where a request is and what it carries.
//!
//! An [`InterpretationContext`] is an immutable value. Every step that
//! changes the scope or the bindings produces a new value with one of the
//! `with_*` constructors; the previous value remains valid for whoever still
//! holds it (for example a caller waiting for a call to return).

use std::fmt;

use archsim_model::expr::{Bindings, Value};
use archsim_model::ids::{AssemblyContextId, RoleId, SignatureId};
use archsim_model::request::RequesterId;

use crate::context::{InfrastructureCallSpec, RequestId, ScopeRef};

/// Per-request state shared by every scope the request passes through.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState {
    pub id: RequestId,
    /// The usage context the behaviour runs in.
    pub assembly: AssemblyContextId,
    pub bindings: Bindings,
}

impl RequestState {
    #[must_use]
    pub fn new(id: RequestId, assembly: AssemblyContextId, bindings: Bindings) -> Self {
        Self {
            id,
            assembly,
            bindings,
        }
    }

    /// The identity the resource simulation echoes back for this request.
    #[must_use]
    pub fn requester(&self) -> RequesterId {
        RequesterId(self.id.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpretationContext {
    pub scope: ScopeRef,
    pub request: RequestState,
    /// Where to continue once this behaviour, called as an operation,
    /// finishes.
    pub caller: Option<Box<InterpretationContext>>,
    /// The infrastructure segment waiting for this behaviour to finish.
    pub infrastructure_caller: Option<Box<InterpretationContext>>,
}

impl InterpretationContext {
    #[must_use]
    pub fn new(scope: ScopeRef, request: RequestState) -> Self {
        Self {
            scope,
            request,
            caller: None,
            infrastructure_caller: None,
        }
    }

    #[must_use]
    pub fn with_scope(&self, scope: ScopeRef) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_bindings(&self, bindings: Bindings) -> Self {
        let mut context = self.clone();
        context.request.bindings = bindings;
        context
    }

    #[must_use]
    pub fn with_caller(&self, caller: InterpretationContext) -> Self {
        Self {
            caller: Some(Box::new(caller)),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_infrastructure_caller(&self, caller: InterpretationContext) -> Self {
        Self {
            infrastructure_caller: Some(Box::new(caller)),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.request.id
    }
}

impl fmt::Display for InterpretationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.request.id, self.scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    External,
    Infrastructure,
}

/// A request to run the behaviour providing `signature` of `role`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub role: RoleId,
    pub signature: SignatureId,
    pub inputs: Vec<(String, Value)>,
    pub kind: CallKind,
    /// The context to continue when the call returns.
    pub caller: InterpretationContext,
}

impl CallRequest {
    #[must_use]
    pub fn external(
        role: RoleId,
        signature: SignatureId,
        inputs: Vec<(String, Value)>,
        caller: InterpretationContext,
    ) -> Self {
        Self {
            role,
            signature,
            inputs,
            kind: CallKind::External,
            caller,
        }
    }

    #[must_use]
    pub fn infrastructure(spec: InfrastructureCallSpec, caller: InterpretationContext) -> Self {
        Self {
            role: spec.role,
            signature: spec.signature,
            inputs: spec.inputs,
            kind: CallKind::Infrastructure,
            caller,
        }
    }

    #[must_use]
    pub fn request(&self) -> RequestId {
        self.caller.request.id
    }
}

impl fmt::Display for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} from {}", self.role, self.signature, self.caller)
    }
}
