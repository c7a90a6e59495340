// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The behaviour interpreter.
//!
//! [`Interpreter::interpret`] looks at the action under the cursor of one
//! scope and returns the events that carry out that action. It keeps no
//! per-request state of its own: nested scopes are created in the
//! [`ContextArena`] it is handed and everything else travels in the
//! [`InterpretationContext`] of the returned events.

use std::sync::Arc;

use archsim_engine::events::Scheduled;
use archsim_engine::sim_error;
use archsim_engine::types::SimError;
use archsim_model::behaviour::{ActionKind, Behaviour, BranchTransition, InfrastructureCall};
use archsim_model::expr::{Bindings, Evaluate, Expr, ExprEvaluator, Value};
use archsim_model::ids::ActionId;
use archsim_model::request::{Demand, PassiveRelease};
use archsim_model::topology::unit_interval;
use archsim_track::entity::Entity;
use archsim_track::trace;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::context::{
    BehaviourContext, BehaviourCursor, ContextArena, ContextKind, InfrastructureCallSpec, ScopeRef,
};
use crate::events::InterpretationEvent;
use crate::interpretation::{CallRequest, InterpretationContext};

pub type InterpretResult = Result<Vec<Scheduled<InterpretationEvent>>, SimError>;

fn now(event: InterpretationEvent) -> InterpretResult {
    Ok(vec![Scheduled::now(event)])
}

pub struct Interpreter {
    pub entity: Arc<Entity>,
    rng: StdRng,
    evaluator: Box<dyn Evaluate>,
}

impl Interpreter {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, seed: u64) -> Self {
        Self {
            entity: Arc::new(Entity::new(parent, "interpreter")),
            rng: StdRng::seed_from_u64(seed),
            evaluator: Box::new(ExprEvaluator),
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluate>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Carry out the action under the cursor of `context.scope`.
    pub fn interpret(
        &mut self,
        arena: &mut ContextArena,
        context: &InterpretationContext,
    ) -> InterpretResult {
        let (action, behaviour, current) = {
            let cursor = arena
                .get(context.scope.context)?
                .cursor(context.scope.member)?;
            (
                cursor.action()?.clone(),
                cursor.behaviour().clone(),
                cursor.current(),
            )
        };
        trace!(self.entity ; "{}: {} '{}'", context, action.kind.kind_name(), action.name);

        let bindings = &context.request.bindings;
        match action.kind {
            ActionKind::Start => now(InterpretationEvent::Progressed(context.clone())),
            ActionKind::Stop => now(InterpretationEvent::Finished(context.clone())),
            ActionKind::Branch { transitions } => {
                let body = self.choose_transition(&behaviour, &action.name, &transitions, bindings)?;
                let cursor = BehaviourCursor::new(&body)?;
                let successor = behaviour.successor(current)?;
                self.start_child(arena, context, successor, ContextKind::Branch { cursor })
            }
            ActionKind::Loop { iterations, body } => {
                let target = self.evaluator.evaluate_count(&iterations, bindings)?;
                if target == 0 {
                    trace!(self.entity ; "{}: skip loop '{}'", context, action.name);
                    return now(InterpretationEvent::Progressed(context.clone()));
                }
                let cursor = BehaviourCursor::new(&body)?;
                let successor = behaviour.successor(current)?;
                let kind = ContextKind::Loop {
                    cursor,
                    iteration: 1,
                    target,
                };
                self.start_child(arena, context, successor, kind)
            }
            ActionKind::Fork { synchronised } => {
                if synchronised.is_empty() {
                    return sim_error!(format!(
                        "Fork '{}' of behaviour '{}' has no synchronised behaviours",
                        action.name, behaviour
                    ));
                }
                let members = synchronised
                    .iter()
                    .map(BehaviourCursor::new)
                    .collect::<Result<Vec<_>, _>>()?;
                let num_members = members.len();
                let successor = behaviour.successor(current)?;
                let fork = BehaviourContext::new(
                    context.id(),
                    Some(context.scope),
                    Some(successor),
                    ContextKind::Fork {
                        members,
                        current: 0,
                        processed: false,
                        delivered: 0,
                    },
                )?;
                let fork_id = arena.insert(fork);
                trace!(self.entity ; "{}: fork {} with {} members", context, fork_id, num_members);
                Ok((0..num_members)
                    .map(|member| {
                        let scope = ScopeRef::new(fork_id, member);
                        Scheduled::now(InterpretationEvent::ChildStarted(context.with_scope(scope)))
                    })
                    .collect())
            }
            ActionKind::ExternalCall {
                role,
                signature,
                inputs,
            } => {
                let inputs = self.evaluate_inputs(&inputs, bindings)?;
                let call = CallRequest::external(role, signature, inputs, context.clone());
                now(InterpretationEvent::ExternalCallRequested(call))
            }
            ActionKind::InternalAction {
                demands,
                infrastructure_calls,
            } => {
                let calls = self.expand_infrastructure_calls(&infrastructure_calls, bindings)?;
                if !demands.is_empty() {
                    let demands = demands
                        .into_iter()
                        .map(|demand| Demand::Active {
                            resource_type: demand.resource_type,
                            amount: demand.amount,
                        })
                        .collect();
                    now(InterpretationEvent::DemandsRequested {
                        context: context.clone(),
                        demands,
                        infrastructure_calls: calls,
                    })
                } else if !calls.is_empty() {
                    self.start_segment(arena, context, calls)
                } else {
                    now(InterpretationEvent::Progressed(context.clone()))
                }
            }
            ActionKind::Acquire { semaphore, amount } => now(InterpretationEvent::DemandsRequested {
                context: context.clone(),
                demands: vec![Demand::Passive { semaphore, amount }],
                infrastructure_calls: Vec::new(),
            }),
            ActionKind::Release { semaphore, amount } => {
                let release = PassiveRelease {
                    requester: context.request.requester(),
                    assembly: context.request.assembly.clone(),
                    semaphore,
                    amount,
                };
                Ok(vec![
                    Scheduled::now(InterpretationEvent::PassiveReleaseRequested(release)),
                    Scheduled::now(InterpretationEvent::Progressed(context.clone())),
                ])
            }
            ActionKind::SetVariable { assignments } => {
                let mut updated = bindings.clone();
                for (name, expr) in &assignments {
                    let value = self.evaluator.evaluate(expr, &updated)?;
                    trace!(self.entity ; "{}: {} = {}", context, name, value);
                    updated.set(name, value);
                }
                now(InterpretationEvent::Progressed(
                    context.with_bindings(updated),
                ))
            }
        }
    }

    /// Run `calls` in a new infrastructure segment nested in the scope of
    /// `context`, continuing after its current action when done.
    pub fn start_segment(
        &mut self,
        arena: &mut ContextArena,
        context: &InterpretationContext,
        calls: Vec<InfrastructureCallSpec>,
    ) -> InterpretResult {
        let cursor = arena
            .get(context.scope.context)?
            .cursor(context.scope.member)?;
        let successor = cursor.behaviour().successor(cursor.current())?;
        let kind = ContextKind::InfrastructureSegment { calls, position: 0 };
        let segment = BehaviourContext::new(context.id(), Some(context.scope), Some(successor), kind)?;
        let segment_id = arena.insert(segment);
        trace!(self.entity ; "{}: infrastructure segment {}", context, segment_id);
        now(InterpretationEvent::InfrastructureSegmentProgressed(
            context.with_scope(ScopeRef::new(segment_id, 0)),
        ))
    }

    fn start_child(
        &self,
        arena: &mut ContextArena,
        context: &InterpretationContext,
        successor: ActionId,
        kind: ContextKind,
    ) -> InterpretResult {
        let child = BehaviourContext::new(context.id(), Some(context.scope), Some(successor), kind)?;
        let name = child.kind().name();
        let child_id = arena.insert(child);
        trace!(self.entity ; "{}: {} {}", context, name, child_id);
        now(InterpretationEvent::ChildStarted(
            context.with_scope(ScopeRef::new(child_id, 0)),
        ))
    }

    fn choose_transition(
        &mut self,
        behaviour: &Behaviour,
        action_name: &str,
        transitions: &[BranchTransition],
        bindings: &Bindings,
    ) -> Result<Arc<Behaviour>, SimError> {
        if transitions.is_empty() {
            return sim_error!(format!(
                "Branch '{action_name}' of behaviour '{behaviour}' has no transitions"
            ));
        }

        let probabilities: Vec<(f64, &Arc<Behaviour>)> = transitions
            .iter()
            .filter_map(|transition| match transition {
                BranchTransition::Probabilistic { probability, body } => {
                    Some((*probability, body))
                }
                BranchTransition::Guarded { .. } => None,
            })
            .collect();

        if probabilities.len() == transitions.len() {
            if probabilities.iter().any(|(p, _)| p.is_nan() || *p < 0.0) {
                return sim_error!(format!(
                    "Branch '{action_name}' of behaviour '{behaviour}' has a negative probability"
                ));
            }
            let total: f64 = probabilities.iter().map(|(p, _)| p).sum();
            if total <= 0.0 {
                return sim_error!(format!(
                    "Branch '{action_name}' of behaviour '{behaviour}' has no enabled transition"
                ));
            }

            let draw = total * unit_interval(&mut self.rng);
            let mut cumulative = 0.0;
            for (probability, body) in &probabilities {
                cumulative += probability;
                if cumulative > draw {
                    return Ok((*body).clone());
                }
            }
            // Rounding can leave the sum just short of the draw
            return match probabilities.iter().rev().find(|(p, _)| *p > 0.0) {
                Some((_, body)) => Ok((*body).clone()),
                None => sim_error!(format!(
                    "Branch '{action_name}' of behaviour '{behaviour}' has no enabled transition"
                )),
            };
        }

        if !probabilities.is_empty() {
            return sim_error!(format!(
                "Branch '{action_name}' of behaviour '{behaviour}' mixes probabilistic and guarded transitions"
            ));
        }

        for transition in transitions {
            if let BranchTransition::Guarded { guard, body } = transition {
                if self.evaluator.evaluate_bool(guard, bindings)? {
                    return Ok(body.clone());
                }
            }
        }
        sim_error!(format!(
            "Branch '{action_name}' of behaviour '{behaviour}' has no enabled transition"
        ))
    }

    fn evaluate_inputs(
        &self,
        inputs: &[(String, Expr)],
        bindings: &Bindings,
    ) -> Result<Vec<(String, Value)>, SimError> {
        inputs
            .iter()
            .map(|(name, expr)| Ok((name.clone(), self.evaluator.evaluate(expr, bindings)?)))
            .collect()
    }

    /// Expand each call into as many copies as its count evaluates to.
    fn expand_infrastructure_calls(
        &self,
        calls: &[InfrastructureCall],
        bindings: &Bindings,
    ) -> Result<Vec<InfrastructureCallSpec>, SimError> {
        let mut expanded = Vec::new();
        for call in calls {
            let count = self.evaluator.evaluate_count(&call.count, bindings)?;
            let spec = InfrastructureCallSpec {
                role: call.role.clone(),
                signature: call.signature.clone(),
                inputs: self.evaluate_inputs(&call.inputs, bindings)?,
            };
            for _ in 0..count {
                expanded.push(spec.clone());
            }
        }
        Ok(expanded)
    }
}
