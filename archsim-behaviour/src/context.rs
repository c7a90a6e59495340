// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Behaviour contexts.
//!
//! A context is one nested scope of a behaviour graph being interpreted on
//! behalf of a request: the root behaviour, the body chosen by a branch, the
//! body of a loop, the members of a fork, or a flat list of infrastructure
//! calls. Contexts live in a [`ContextArena`] and refer to their parent by
//! [`ScopeRef`], never by pointer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use archsim_engine::sim_error;
use archsim_engine::types::{SimError, SimResult};
use archsim_model::behaviour::{Action, ActionKind, Behaviour};
use archsim_model::expr::Value;
use archsim_model::ids::{ActionId, RoleId, SignatureId};

/// Identity of one user request and everything it calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request{}", self.0)
    }
}

/// Handle of a context in the [`ContextArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// A scope that can be interpreted: a context and, for forks, the member
/// within it. All other contexts only have member 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeRef {
    pub context: ContextId,
    pub member: usize,
}

impl ScopeRef {
    #[must_use]
    pub fn new(context: ContextId, member: usize) -> Self {
        Self { context, member }
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.member == 0 {
            write!(f, "{}", self.context)
        } else {
            write!(f, "{}.{}", self.context, self.member)
        }
    }
}

/// Position within one behaviour graph.
#[derive(Debug, Clone)]
pub struct BehaviourCursor {
    behaviour: Arc<Behaviour>,
    current: ActionId,
}

impl BehaviourCursor {
    /// Place a cursor on the `Start` action of `behaviour`.
    pub fn new(behaviour: &Arc<Behaviour>) -> Result<Self, SimError> {
        let current = behaviour.start()?;
        Ok(Self {
            behaviour: behaviour.clone(),
            current,
        })
    }

    #[must_use]
    pub fn behaviour(&self) -> &Arc<Behaviour> {
        &self.behaviour
    }

    #[must_use]
    pub fn current(&self) -> ActionId {
        self.current
    }

    pub fn action(&self) -> Result<&Action, SimError> {
        self.behaviour.action(self.current)
    }

    /// Whether the cursor has reached a `Stop` action.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(
            self.behaviour.action(self.current).map(|action| &action.kind),
            Ok(ActionKind::Stop)
        )
    }

    pub fn advance(&mut self) -> SimResult {
        self.current = self.behaviour.successor(self.current)?;
        Ok(())
    }

    pub fn jump(&mut self, to: ActionId) -> SimResult {
        self.behaviour.action(to)?;
        self.current = to;
        Ok(())
    }

    pub fn reset(&mut self) -> SimResult {
        self.current = self.behaviour.start()?;
        Ok(())
    }
}

/// One infrastructure call with its inputs already evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct InfrastructureCallSpec {
    pub role: RoleId,
    pub signature: SignatureId,
    pub inputs: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub enum ContextKind {
    Root {
        cursor: BehaviourCursor,
    },
    Branch {
        cursor: BehaviourCursor,
    },
    Loop {
        cursor: BehaviourCursor,
        /// The iteration being run, starting at 1.
        iteration: u64,
        target: u64,
    },
    Fork {
        members: Vec<BehaviourCursor>,
        /// Round-robin pointer to the member stepped next.
        current: usize,
        processed: bool,
        /// Number of member `Finished` events handled so far.
        delivered: usize,
    },
    InfrastructureSegment {
        calls: Vec<InfrastructureCallSpec>,
        position: usize,
    },
}

impl ContextKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ContextKind::Root { .. } => "root",
            ContextKind::Branch { .. } => "branch",
            ContextKind::Loop { .. } => "loop",
            ContextKind::Fork { .. } => "fork",
            ContextKind::InfrastructureSegment { .. } => "infrastructure segment",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BehaviourContext {
    owner: RequestId,
    parent: Option<ScopeRef>,
    successor: Option<ActionId>,
    kind: ContextKind,
}

impl BehaviourContext {
    /// Create a context. A context that resumes its parent at a successor
    /// action must have a parent, and only a root context has none.
    pub fn new(
        owner: RequestId,
        parent: Option<ScopeRef>,
        successor: Option<ActionId>,
        kind: ContextKind,
    ) -> Result<Self, SimError> {
        if successor.is_some() && parent.is_none() {
            return sim_error!(format!(
                "A {} context with a successor needs a parent",
                kind.name()
            ));
        }
        match (&kind, parent.is_some()) {
            (ContextKind::Root { .. }, true) => {
                return sim_error!("A root context cannot have a parent");
            }
            (ContextKind::Root { .. }, false) | (_, true) => {}
            (_, false) => {
                return sim_error!(format!("A {} context needs a parent", kind.name()));
            }
        }
        if let ContextKind::Fork { members, .. } = &kind {
            if members.is_empty() {
                return sim_error!("A fork context needs at least one member");
            }
        }
        Ok(Self {
            owner,
            parent,
            successor,
            kind,
        })
    }

    /// A root context for `behaviour`.
    pub fn root(owner: RequestId, behaviour: &Arc<Behaviour>) -> Result<Self, SimError> {
        let cursor = BehaviourCursor::new(behaviour)?;
        Self::new(owner, None, None, ContextKind::Root { cursor })
    }

    #[must_use]
    pub fn owner(&self) -> RequestId {
        self.owner
    }

    #[must_use]
    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent
    }

    #[must_use]
    pub fn successor(&self) -> Option<ActionId> {
        self.successor
    }

    #[must_use]
    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn cursor(&self, member: usize) -> Result<&BehaviourCursor, SimError> {
        let cursor = match (&self.kind, member) {
            (ContextKind::Root { cursor }, 0)
            | (ContextKind::Branch { cursor }, 0)
            | (ContextKind::Loop { cursor, .. }, 0) => Some(cursor),
            (ContextKind::Fork { members, .. }, _) => members.get(member),
            _ => None,
        };
        match cursor {
            Some(cursor) => Ok(cursor),
            None => sim_error!(format!(
                "A {} context has no behaviour member {member}",
                self.kind.name()
            )),
        }
    }

    pub fn cursor_mut(&mut self, member: usize) -> Result<&mut BehaviourCursor, SimError> {
        let name = self.kind.name();
        let cursor = match (&mut self.kind, member) {
            (ContextKind::Root { cursor }, 0)
            | (ContextKind::Branch { cursor }, 0)
            | (ContextKind::Loop { cursor, .. }, 0) => Some(cursor),
            (ContextKind::Fork { members, .. }, _) => members.get_mut(member),
            _ => None,
        };
        match cursor {
            Some(cursor) => Ok(cursor),
            None => sim_error!(format!("A {name} context has no behaviour member {member}")),
        }
    }

    /// Whether every wrapped behaviour has reached its `Stop` action and,
    /// for a loop, no iterations remain.
    #[must_use]
    pub fn has_finished(&self) -> bool {
        match &self.kind {
            ContextKind::Root { cursor } | ContextKind::Branch { cursor } => cursor.is_finished(),
            ContextKind::Loop {
                cursor,
                iteration,
                target,
            } => cursor.is_finished() && iteration >= target,
            ContextKind::Fork { members, .. } => members.iter().all(BehaviourCursor::is_finished),
            ContextKind::InfrastructureSegment { calls, position } => *position >= calls.len(),
        }
    }

    #[must_use]
    pub fn can_repeat(&self) -> bool {
        match &self.kind {
            ContextKind::Loop {
                iteration, target, ..
            } => iteration < target,
            _ => false,
        }
    }

    /// Start the next loop iteration from the `Start` action of the body.
    pub fn repeat(&mut self) -> Result<u64, SimError> {
        match &mut self.kind {
            ContextKind::Loop {
                cursor,
                iteration,
                target,
            } if *iteration < *target => {
                cursor.reset()?;
                *iteration += 1;
                Ok(*iteration)
            }
            ContextKind::Loop { target, .. } => {
                sim_error!(format!("Loop already ran its {target} iterations"))
            }
            kind => sim_error!(format!("Cannot repeat a {} context", kind.name())),
        }
    }

    /// Move the round-robin pointer of a fork to the next member that has
    /// not finished. Returns `None` once all members have finished.
    pub fn next_unfinished_member(&mut self) -> Option<usize> {
        let ContextKind::Fork {
            members, current, ..
        } = &mut self.kind
        else {
            return None;
        };
        let num_members = members.len();
        let next = (1..=num_members)
            .map(|offset| (*current + offset) % num_members)
            .find(|&member| !members[member].is_finished())?;
        *current = next;
        Some(next)
    }

    /// Set the one-shot processed flag of a fork. Only the first call
    /// returns `true`.
    /// Count one member `Finished` event of a fork. Returns true once the
    /// event of every member has been handled.
    pub fn note_member_finished(&mut self) -> bool {
        match &mut self.kind {
            ContextKind::Fork {
                members, delivered, ..
            } => {
                *delivered += 1;
                *delivered >= members.len()
            }
            _ => false,
        }
    }

    pub fn take_processed(&mut self) -> bool {
        match &mut self.kind {
            ContextKind::Fork { processed, .. } => !std::mem::replace(processed, true),
            _ => false,
        }
    }

    /// The next call of an infrastructure segment, if any remain.
    pub fn next_call(&mut self) -> Option<InfrastructureCallSpec> {
        match &mut self.kind {
            ContextKind::InfrastructureSegment { calls, position } => {
                let call = calls.get(*position).cloned();
                if call.is_some() {
                    *position += 1;
                }
                call
            }
            _ => None,
        }
    }
}

/// Owner of all live contexts.
#[derive(Default)]
pub struct ContextArena {
    contexts: HashMap<ContextId, BehaviourContext>,
    next_id: u64,
}

impl ContextArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, context: BehaviourContext) -> ContextId {
        let id = ContextId(self.next_id);
        self.next_id += 1;
        self.contexts.insert(id, context);
        id
    }

    pub fn get(&self, id: ContextId) -> Result<&BehaviourContext, SimError> {
        match self.contexts.get(&id) {
            Some(context) => Ok(context),
            None => sim_error!(format!("No live context {id}")),
        }
    }

    pub fn get_mut(&mut self, id: ContextId) -> Result<&mut BehaviourContext, SimError> {
        match self.contexts.get_mut(&id) {
            Some(context) => Ok(context),
            None => sim_error!(format!("No live context {id}")),
        }
    }

    pub fn remove(&mut self, id: ContextId) -> Option<BehaviourContext> {
        self.contexts.remove(&id)
    }

    /// Drop every context owned by `request`, returning how many there were.
    pub fn release_request(&mut self, request: RequestId) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, context| context.owner != request);
        before - self.contexts.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archsim_model::expr::Expr;

    fn body() -> Arc<Behaviour> {
        Behaviour::sequence("body", vec![("cpu", ActionKind::demand("CPU", Expr::int(1)))])
    }

    fn run_to_stop(cursor: &mut BehaviourCursor) {
        while !cursor.is_finished() {
            cursor.advance().unwrap();
        }
    }

    fn parent_scope() -> Option<ScopeRef> {
        Some(ScopeRef::new(ContextId(0), 0))
    }

    #[test]
    fn successor_requires_parent() {
        let cursor = BehaviourCursor::new(&body()).unwrap();
        let context = BehaviourContext::new(
            RequestId(0),
            None,
            Some(ActionId(2)),
            ContextKind::Branch { cursor },
        );
        assert!(context.is_err());
    }

    #[test]
    fn root_has_no_parent() {
        let cursor = BehaviourCursor::new(&body()).unwrap();
        let context =
            BehaviourContext::new(RequestId(0), parent_scope(), None, ContextKind::Root { cursor });
        assert!(context.is_err());
        assert!(BehaviourContext::root(RequestId(0), &body()).is_ok());
    }

    #[test]
    fn loop_finishes_after_last_iteration() {
        let cursor = BehaviourCursor::new(&body()).unwrap();
        let mut context = BehaviourContext::new(
            RequestId(0),
            parent_scope(),
            Some(ActionId(2)),
            ContextKind::Loop {
                cursor,
                iteration: 1,
                target: 3,
            },
        )
        .unwrap();

        let mut completions = 0;
        loop {
            run_to_stop(context.cursor_mut(0).unwrap());
            completions += 1;
            if !context.can_repeat() {
                break;
            }
            assert!(!context.has_finished());
            context.repeat().unwrap();
            assert!(!context.cursor(0).unwrap().is_finished());
        }
        assert_eq!(completions, 3);
        assert!(context.has_finished());
        assert!(context.repeat().is_err());
    }

    #[test]
    fn fork_round_robin_skips_finished_members() {
        let members = (0..3).map(|_| BehaviourCursor::new(&body()).unwrap()).collect();
        let mut context = BehaviourContext::new(
            RequestId(0),
            parent_scope(),
            Some(ActionId(2)),
            ContextKind::Fork {
                members,
                current: 0,
                processed: false,
                delivered: 0,
            },
        )
        .unwrap();

        assert_eq!(context.next_unfinished_member(), Some(1));
        run_to_stop(context.cursor_mut(2).unwrap());
        assert_eq!(context.next_unfinished_member(), Some(0));
        run_to_stop(context.cursor_mut(0).unwrap());
        assert_eq!(context.next_unfinished_member(), Some(1));
        run_to_stop(context.cursor_mut(1).unwrap());
        assert_eq!(context.next_unfinished_member(), None);
        assert!(context.has_finished());

        assert!(context.take_processed());
        assert!(!context.take_processed());

        assert!(!context.note_member_finished());
        assert!(!context.note_member_finished());
        assert!(context.note_member_finished());
    }

    #[test]
    fn empty_fork_rejected() {
        let context = BehaviourContext::new(
            RequestId(0),
            parent_scope(),
            Some(ActionId(2)),
            ContextKind::Fork {
                members: Vec::new(),
                current: 0,
                processed: false,
                delivered: 0,
            },
        );
        assert!(context.is_err());
    }

    #[test]
    fn segment_hands_out_calls_in_order() {
        let call = |signature: &str| InfrastructureCallSpec {
            role: RoleId::new("middleware"),
            signature: SignatureId::new(signature),
            inputs: Vec::new(),
        };
        let mut context = BehaviourContext::new(
            RequestId(0),
            parent_scope(),
            Some(ActionId(2)),
            ContextKind::InfrastructureSegment {
                calls: vec![call("marshal"), call("send")],
                position: 0,
            },
        )
        .unwrap();

        assert_eq!(context.next_call().unwrap().signature.as_str(), "marshal");
        assert!(!context.has_finished());
        assert_eq!(context.next_call().unwrap().signature.as_str(), "send");
        assert!(context.has_finished());
        assert!(context.next_call().is_none());
    }

    #[test]
    fn release_request_drops_owned_contexts() {
        let mut arena = ContextArena::new();
        arena.insert(BehaviourContext::root(RequestId(1), &body()).unwrap());
        arena.insert(BehaviourContext::root(RequestId(2), &body()).unwrap());
        arena.insert(BehaviourContext::root(RequestId(1), &body()).unwrap());

        assert_eq!(arena.release_request(RequestId(1)), 2);
        assert_eq!(arena.len(), 1);
    }
}
