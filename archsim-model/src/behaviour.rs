// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Behaviour graphs.
//!
//! A [`Behaviour`] is a sequence of [`Action`]s linked by successor
//! references, running from a single `Start` action to a `Stop` action.
//! Branch, loop and fork actions nest further behaviours.

use std::fmt;
use std::sync::Arc;

use archsim_engine::sim_error;
use archsim_engine::types::{SimError, SimResult};
use itertools::Itertools;

use crate::expr::Expr;
use crate::ids::{ActionId, ResourceTypeId, RoleId, SemaphoreId, SignatureId};

/// A demand for an active resource whose amount depends on the bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametricDemand {
    pub resource_type: ResourceTypeId,
    pub amount: Expr,
}

impl ParametricDemand {
    #[must_use]
    pub fn new(resource_type: &str, amount: Expr) -> Self {
        Self {
            resource_type: ResourceTypeId::new(resource_type),
            amount,
        }
    }
}

/// A call to an operation of the infrastructure (e.g. middleware) that is
/// repeated `count` times.
#[derive(Debug, Clone, PartialEq)]
pub struct InfrastructureCall {
    pub role: RoleId,
    pub signature: SignatureId,
    pub count: Expr,
    pub inputs: Vec<(String, Expr)>,
}

impl InfrastructureCall {
    #[must_use]
    pub fn new(role: &str, signature: &str, count: Expr) -> Self {
        Self {
            role: RoleId::new(role),
            signature: SignatureId::new(signature),
            count,
            inputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BranchTransition {
    Probabilistic {
        probability: f64,
        body: Arc<Behaviour>,
    },
    Guarded {
        guard: Expr,
        body: Arc<Behaviour>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Start,
    Stop,
    Branch {
        transitions: Vec<BranchTransition>,
    },
    Loop {
        iterations: Expr,
        body: Arc<Behaviour>,
    },
    Fork {
        synchronised: Vec<Arc<Behaviour>>,
    },
    ExternalCall {
        role: RoleId,
        signature: SignatureId,
        inputs: Vec<(String, Expr)>,
    },
    InternalAction {
        demands: Vec<ParametricDemand>,
        infrastructure_calls: Vec<InfrastructureCall>,
    },
    Acquire {
        semaphore: SemaphoreId,
        amount: u64,
    },
    Release {
        semaphore: SemaphoreId,
        amount: u64,
    },
    SetVariable {
        assignments: Vec<(String, Expr)>,
    },
}

impl ActionKind {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Branch { .. } => "branch",
            ActionKind::Loop { .. } => "loop",
            ActionKind::Fork { .. } => "fork",
            ActionKind::ExternalCall { .. } => "external call",
            ActionKind::InternalAction { .. } => "internal action",
            ActionKind::Acquire { .. } => "acquire",
            ActionKind::Release { .. } => "release",
            ActionKind::SetVariable { .. } => "set variable",
        }
    }

    #[must_use]
    pub fn external_call(role: &str, signature: &str) -> Self {
        ActionKind::ExternalCall {
            role: RoleId::new(role),
            signature: SignatureId::new(signature),
            inputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn demand(resource_type: &str, amount: Expr) -> Self {
        ActionKind::InternalAction {
            demands: vec![ParametricDemand::new(resource_type, amount)],
            infrastructure_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn acquire(semaphore: &str, amount: u64) -> Self {
        ActionKind::Acquire {
            semaphore: SemaphoreId::new(semaphore),
            amount,
        }
    }

    #[must_use]
    pub fn release(semaphore: &str, amount: u64) -> Self {
        ActionKind::Release {
            semaphore: SemaphoreId::new(semaphore),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    pub successor: Option<ActionId>,
}

impl Action {
    #[must_use]
    pub fn new(name: &str, kind: ActionKind, successor: Option<ActionId>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            successor,
        }
    }
}

/// A behaviour graph. Actions are addressed by their position.
#[derive(Debug, Clone, PartialEq)]
pub struct Behaviour {
    name: String,
    actions: Vec<Action>,
}

impl Behaviour {
    /// Create a behaviour from explicitly linked actions.
    ///
    /// The graph is not validated here; a missing `Start` or a chain that
    /// never reaches `Stop` is reported by [`Behaviour::start`].
    #[must_use]
    pub fn new(name: &str, actions: Vec<Action>) -> Self {
        Self {
            name: name.to_string(),
            actions,
        }
    }

    /// Create a linear behaviour: `Start`, then `actions` in order, then
    /// `Stop`.
    #[must_use]
    pub fn sequence(name: &str, actions: Vec<(&str, ActionKind)>) -> Arc<Self> {
        let num_actions = actions.len() + 2;
        let mut linked = Vec::with_capacity(num_actions);
        linked.push(Action::new("start", ActionKind::Start, Some(ActionId(1))));
        for (i, (action_name, kind)) in actions.into_iter().enumerate() {
            linked.push(Action::new(action_name, kind, Some(ActionId(i + 2))));
        }
        linked.push(Action::new("stop", ActionKind::Stop, None));
        Arc::new(Self::new(name, linked))
    }

    /// A behaviour that does nothing.
    #[must_use]
    pub fn empty(name: &str) -> Arc<Self> {
        Self::sequence(name, Vec::new())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Locate the `Start` action. A `Stop` action must be reachable from it.
    pub fn start(&self) -> Result<ActionId, SimError> {
        let starts = self
            .actions
            .iter()
            .positions(|a| a.kind == ActionKind::Start)
            .collect_vec();
        match starts.as_slice() {
            [start] => {
                let start = ActionId(*start);
                self.check_reaches_stop(start)?;
                Ok(start)
            }
            [] => sim_error!(format!("Behaviour '{}' has no start action", self.name)),
            _ => sim_error!(format!(
                "Behaviour '{}' has multiple start actions ({})",
                self.name,
                starts.iter().join(", ")
            )),
        }
    }

    /// Follow successors from `start`. Every action is visited at most once
    /// on the way to `Stop`, so a longer chain must contain a cycle.
    fn check_reaches_stop(&self, start: ActionId) -> SimResult {
        let mut current = start;
        for _ in 0..self.actions.len() {
            if self.action(current)?.kind == ActionKind::Stop {
                return Ok(());
            }
            current = self.successor(current)?;
        }
        sim_error!(format!(
            "Behaviour '{}' loops from its start action without reaching a stop action",
            self.name
        ))
    }

    pub fn action(&self, id: ActionId) -> Result<&Action, SimError> {
        match self.actions.get(id.0) {
            Some(action) => Ok(action),
            None => sim_error!(format!("Behaviour '{}' has no action {id}", self.name)),
        }
    }

    /// The action following `id`. Only a `Stop` action may have none.
    pub fn successor(&self, id: ActionId) -> Result<ActionId, SimError> {
        let action = self.action(id)?;
        match action.successor {
            Some(next) => {
                self.action(next)?;
                Ok(next)
            }
            None => sim_error!(format!(
                "Behaviour '{}': {} action '{}' has no successor and no stop action follows",
                self.name,
                action.kind.kind_name(),
                action.name
            )),
        }
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
