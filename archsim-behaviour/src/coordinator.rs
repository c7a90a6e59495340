// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The interpretation coordinator.
//!
//! The coordinator owns the [`ContextArena`] and drives the [`Interpreter`]:
//! it advances cursors, resumes parent scopes and callers when a scope
//! finishes, joins forks and the demands of a single action, and tears down
//! all bookkeeping of a request once it finishes or is aborted.
//!
//! Configuration errors found while interpreting only abort the request they
//! belong to. The simulation carries on with every other request.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use archsim_engine::events::Scheduled;
use archsim_engine::sim_error;
use archsim_engine::traits::Handler;
use archsim_engine::types::SimError;
use archsim_model::behaviour::Behaviour;
use archsim_model::expr::{Bindings, Evaluate};
use archsim_model::ids::{ActionId, AssemblyContextId, SemaphoreId};
use archsim_model::request::{
    Demand, DemandId, PassiveRelease, RequesterId, ResourceDemandRequest,
};
use archsim_track::entity::Entity;
use archsim_track::Tag;
use archsim_track::{create, create_tag, debug, destroy, error, trace};

use crate::context::{
    BehaviourContext, ContextArena, ContextKind, InfrastructureCallSpec, RequestId, ScopeRef,
};
use crate::events::InterpretationEvent;
use crate::interpretation::{CallKind, CallRequest, InterpretationContext, RequestState};
use crate::interpreter::{InterpretResult, Interpreter};

type Events = Vec<Scheduled<InterpretationEvent>>;

/// The demands of one action that have not been satisfied yet.
struct PendingDemands {
    context: InterpretationContext,
    outstanding: HashSet<DemandId>,
    infrastructure_calls: Vec<InfrastructureCallSpec>,
}

/// Permits currently held by a request, per semaphore of a usage context.
type HeldPermits = BTreeMap<(AssemblyContextId, SemaphoreId), u64>;

pub struct InterpretationCoordinator {
    pub entity: Arc<Entity>,
    interpreter: Interpreter,
    arena: ContextArena,
    live: HashMap<RequestId, Tag>,
    joins: HashMap<RequesterId, PendingDemands>,
    held: HashMap<RequestId, HeldPermits>,
    next_request: u64,
    next_join: u64,
    next_demand: u64,
}

impl InterpretationCoordinator {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, seed: u64) -> Self {
        let entity = Arc::new(Entity::new(parent, "interpretation"));
        Self {
            interpreter: Interpreter::new(&entity, seed),
            entity,
            arena: ContextArena::new(),
            live: HashMap::new(),
            joins: HashMap::new(),
            held: HashMap::new(),
            next_request: 0,
            next_join: 0,
            next_demand: 0,
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluate>) -> Self {
        self.interpreter = self.interpreter.with_evaluator(evaluator);
        self
    }

    /// Start interpreting `behaviour` as a new request.
    pub fn start_request(
        &mut self,
        behaviour: &Arc<Behaviour>,
        assembly: AssemblyContextId,
        bindings: Bindings,
    ) -> (RequestId, Events) {
        let request = RequestId(self.next_request);
        self.next_request += 1;

        let tag = create_tag!(self.entity);
        create!(self.entity ; tag, &request.to_string());
        self.live.insert(request, tag);
        debug!(self.entity ; "start {} with '{}' in {}", request, behaviour, assembly);

        let events = match BehaviourContext::root(request, behaviour) {
            Ok(root) => {
                let root = self.arena.insert(root);
                let state = RequestState::new(request, assembly, bindings);
                let context = InterpretationContext::new(ScopeRef::new(root, 0), state);
                vec![Scheduled::now(InterpretationEvent::ChildStarted(context))]
            }
            Err(e) => self.fail(request, &e),
        };
        (request, events)
    }

    /// Run `behaviour` in `assembly` as the operation requested by `call`.
    /// The caller continues once it finishes.
    pub fn start_call(
        &mut self,
        call: CallRequest,
        behaviour: &Arc<Behaviour>,
        assembly: AssemblyContextId,
    ) -> Events {
        let request = call.request();
        if !self.live.contains_key(&request) {
            trace!(self.entity ; "drop call {} of ended {}", call, request);
            return Vec::new();
        }

        let root = match BehaviourContext::root(request, behaviour) {
            Ok(root) => self.arena.insert(root),
            Err(e) => return self.fail(request, &e),
        };
        trace!(self.entity ; "call {} runs '{}' in {}", call, behaviour, assembly);
        let state = RequestState::new(request, assembly, Bindings::new().with_frame(&call.inputs));
        let callee = InterpretationContext::new(ScopeRef::new(root, 0), state);
        let callee = match call.kind {
            CallKind::External => callee.with_caller(call.caller),
            CallKind::Infrastructure => callee.with_infrastructure_caller(call.caller),
        };
        vec![Scheduled::now(InterpretationEvent::ChildStarted(callee))]
    }

    /// A call could not be carried out, which aborts the calling request.
    pub fn fail_call(&mut self, call: &CallRequest, reason: &str) -> Events {
        self.abort_request(call.request(), format!("call {call} failed: {reason}"))
    }

    pub fn on_demand_satisfied(&mut self, request: &ResourceDemandRequest) -> Events {
        if !self.joins.contains_key(&request.requester) {
            return self.orphaned(request);
        }
        if let Some(pending) = self.joins.get_mut(&request.requester) {
            pending.outstanding.remove(&request.id);
            if let Demand::Passive { semaphore, amount } = &request.demand {
                *self
                    .held
                    .entry(pending.context.id())
                    .or_default()
                    .entry((request.assembly.clone(), semaphore.clone()))
                    .or_default() += amount;
            }
            if !pending.outstanding.is_empty() {
                return Vec::new();
            }
        }
        let Some(pending) = self.joins.remove(&request.requester) else {
            return Vec::new();
        };

        let owner = pending.context.id();
        let result = if pending.infrastructure_calls.is_empty() {
            Ok(vec![Scheduled::now(InterpretationEvent::Progressed(
                pending.context,
            ))])
        } else {
            self.interpreter.start_segment(
                &mut self.arena,
                &pending.context,
                pending.infrastructure_calls,
            )
        };
        self.or_abort(owner, result)
    }

    pub fn on_demand_aborted(&mut self, request: &ResourceDemandRequest, reason: &str) -> Events {
        let owner = self
            .joins
            .get(&request.requester)
            .map(|pending| pending.context.id());
        match owner {
            Some(owner) => self.abort_request(owner, format!("{request} aborted: {reason}")),
            None => {
                trace!(self.entity ; "{} of an ended request aborted", request);
                Vec::new()
            }
        }
    }

    /// Abort `request`, releasing all of its contexts and pending demands
    /// and returning the permits it holds.
    pub fn abort_request(&mut self, request: RequestId, reason: String) -> Events {
        let Some(tag) = self.live.remove(&request) else {
            trace!(self.entity ; "{} already ended ({})", request, reason);
            return Vec::new();
        };
        destroy!(self.entity ; tag);
        let held = self.held.remove(&request).unwrap_or_default();
        self.release(request);
        debug!(self.entity ; "{} aborted: {}", request, reason);

        let mut events: Events = held
            .into_iter()
            .map(|((assembly, semaphore), amount)| {
                debug!(self.entity ; "{} returns {} x {}@{}", request, amount, semaphore, assembly);
                Scheduled::now(InterpretationEvent::PassiveReleaseRequested(PassiveRelease {
                    requester: RequesterId(request.0),
                    assembly,
                    semaphore,
                    amount,
                }))
            })
            .collect();
        events.push(Scheduled::now(InterpretationEvent::RequestAborted {
            request,
            reason,
        }));
        events
    }

    #[must_use]
    pub fn is_live(&self, request: RequestId) -> bool {
        self.live.contains_key(&request)
    }

    #[must_use]
    pub fn num_live_requests(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn num_contexts(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn num_pending_joins(&self) -> usize {
        self.joins.len()
    }

    /// Handle one internal interpretation event.
    pub fn handle(&mut self, _now: f64, event: InterpretationEvent) -> Result<Events, SimError> {
        if event.is_output() {
            return sim_error!(format!(
                "Output event {event:?} delivered to the interpretation coordinator"
            ));
        }
        let request = match event.request() {
            Some(request) if self.live.contains_key(&request) => request,
            _ => {
                trace!(self.entity ; "drop event of ended request: {:?}", event);
                return Ok(Vec::new());
            }
        };

        let result = match event {
            InterpretationEvent::Progressed(context) => self.progress(&context),
            InterpretationEvent::ChildStarted(context) => {
                self.interpreter.interpret(&mut self.arena, &context)
            }
            InterpretationEvent::Resumed { context, successor } => {
                self.resume(&context, successor)
            }
            InterpretationEvent::Finished(context) => self.on_finished(context),
            InterpretationEvent::InfrastructureSegmentProgressed(context) => {
                self.next_infrastructure_call(context)
            }
            InterpretationEvent::DemandsRequested {
                context,
                demands,
                infrastructure_calls,
            } => self.request_demands(context, demands, infrastructure_calls),
            output => sim_error!(format!("Unexpected output {output:?}")),
        };
        let result = result.map(|events| {
            self.note_releases(request, &events);
            events
        });
        Ok(self.or_abort(request, result))
    }

    fn note_releases(&mut self, request: RequestId, events: &Events) {
        let Some(held) = self.held.get_mut(&request) else {
            return;
        };
        for scheduled in events {
            if let InterpretationEvent::PassiveReleaseRequested(release) = &scheduled.event {
                let key = (release.assembly.clone(), release.semaphore.clone());
                if let Some(amount) = held.get_mut(&key) {
                    *amount = amount.saturating_sub(release.amount);
                    if *amount == 0 {
                        held.remove(&key);
                    }
                }
            }
        }
        if held.is_empty() {
            self.held.remove(&request);
        }
    }

    fn fail(&mut self, request: RequestId, e: &SimError) -> Events {
        error!(self.entity ; "{}: {}", request, e);
        self.abort_request(request, e.to_string())
    }

    fn or_abort(&mut self, request: RequestId, result: InterpretResult) -> Events {
        match result {
            Ok(events) => events,
            Err(e) => self.fail(request, &e),
        }
    }

    fn release(&mut self, request: RequestId) {
        let contexts = self.arena.release_request(request);
        self.joins
            .retain(|_, pending| pending.context.id() != request);
        trace!(self.entity ; "{} released {} contexts", request, contexts);
    }

    /// Permits granted to a request that has already ended are handed back.
    fn orphaned(&self, request: &ResourceDemandRequest) -> Events {
        match &request.demand {
            Demand::Passive { semaphore, amount } => {
                debug!(self.entity ; "return {} granted after its request ended", request);
                vec![Scheduled::now(InterpretationEvent::PassiveReleaseRequested(
                    PassiveRelease {
                        requester: request.requester,
                        assembly: request.assembly.clone(),
                        semaphore: semaphore.clone(),
                        amount: *amount,
                    },
                ))]
            }
            Demand::Active { .. } => {
                trace!(self.entity ; "{} satisfied after its request ended", request);
                Vec::new()
            }
        }
    }

    fn progress(&mut self, context: &InterpretationContext) -> InterpretResult {
        self.arena
            .get_mut(context.scope.context)?
            .cursor_mut(context.scope.member)?
            .advance()?;
        self.interpreter.interpret(&mut self.arena, context)
    }

    fn resume(
        &mut self,
        context: &InterpretationContext,
        successor: ActionId,
    ) -> InterpretResult {
        self.arena
            .get_mut(context.scope.context)?
            .cursor_mut(context.scope.member)?
            .jump(successor)?;
        self.interpreter.interpret(&mut self.arena, context)
    }

    fn on_finished(&mut self, context: InterpretationContext) -> InterpretResult {
        let scope = context.scope;
        let finished = self.arena.get_mut(scope.context)?;

        let mut all_delivered = false;
        if let ContextKind::Fork { .. } = finished.kind() {
            all_delivered = finished.note_member_finished();
            if let Some(member) = finished.next_unfinished_member() {
                trace!(self.entity ; "{}: waiting for fork member {}", context, member);
                return Ok(Vec::new());
            }
            if !finished.take_processed() {
                trace!(self.entity ; "{}: fork already joined", context);
                if all_delivered {
                    self.arena.remove(scope.context);
                }
                return Ok(Vec::new());
            }
        } else if finished.can_repeat() {
            let iteration = finished.repeat()?;
            trace!(self.entity ; "{}: loop iteration {}", context, iteration);
            return Ok(vec![Scheduled::now(InterpretationEvent::ChildStarted(
                context,
            ))]);
        }

        if !finished.has_finished() {
            return sim_error!(format!(
                "{context}: {} context finished before all of its behaviours stopped",
                finished.kind().name()
            ));
        }

        let is_fork = matches!(finished.kind(), ContextKind::Fork { .. });
        match (finished.parent(), finished.successor()) {
            (Some(parent), Some(successor)) => {
                // A fork stays until the Finished event of every member is handled
                if !is_fork || all_delivered {
                    self.arena.remove(scope.context);
                }
                Ok(vec![Scheduled::now(InterpretationEvent::Resumed {
                    context: context.with_scope(parent),
                    successor,
                })])
            }
            (Some(_), None) => sim_error!(format!("{context}: nested context has no successor")),
            (None, _) => {
                self.arena.remove(scope.context);
                if let Some(caller) = context.infrastructure_caller {
                    Ok(vec![Scheduled::now(
                        InterpretationEvent::InfrastructureSegmentProgressed(*caller),
                    )])
                } else if let Some(caller) = context.caller {
                    Ok(vec![Scheduled::now(InterpretationEvent::Progressed(*caller))])
                } else {
                    Ok(self.finish_request(context.request.id))
                }
            }
        }
    }

    fn finish_request(&mut self, request: RequestId) -> Events {
        if let Some(tag) = self.live.remove(&request) {
            destroy!(self.entity ; tag);
        }
        self.held.remove(&request);
        self.release(request);
        debug!(self.entity ; "{} finished", request);
        vec![Scheduled::now(InterpretationEvent::RequestFinished { request })]
    }

    fn next_infrastructure_call(&mut self, context: InterpretationContext) -> InterpretResult {
        let segment = self.arena.get_mut(context.scope.context)?;
        match segment.next_call() {
            Some(spec) => {
                trace!(self.entity ; "{}: call {}.{}", context, spec.role, spec.signature);
                let call = CallRequest::infrastructure(spec, context);
                Ok(vec![Scheduled::now(
                    InterpretationEvent::InfrastructureCallRequested(call),
                )])
            }
            None => Ok(vec![Scheduled::now(InterpretationEvent::Finished(context))]),
        }
    }

    fn request_demands(
        &mut self,
        context: InterpretationContext,
        demands: Vec<Demand>,
        infrastructure_calls: Vec<InfrastructureCallSpec>,
    ) -> InterpretResult {
        if demands.is_empty() {
            return sim_error!(format!("{context}: no demands to request"));
        }

        let requester = RequesterId(self.next_join);
        self.next_join += 1;

        let mut outstanding = HashSet::new();
        let mut events = Vec::with_capacity(demands.len());
        for demand in demands {
            let id = DemandId(self.next_demand);
            self.next_demand += 1;
            outstanding.insert(id);
            let request = ResourceDemandRequest {
                id,
                requester,
                assembly: context.request.assembly.clone(),
                demand,
                bindings: context.request.bindings.clone(),
            };
            trace!(self.entity ; "{}: request {}", context, request);
            events.push(Scheduled::now(
                InterpretationEvent::ResourceDemandRequested(request),
            ));
        }
        self.joins.insert(
            requester,
            PendingDemands {
                context,
                outstanding,
                infrastructure_calls,
            },
        );
        Ok(events)
    }
}

impl Handler<InterpretationEvent> for InterpretationCoordinator {
    fn handle(&mut self, now: f64, event: InterpretationEvent) -> Result<Events, SimError> {
        InterpretationCoordinator::handle(self, now, event)
    }
}
