// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Operations provided by the deployed components.

use std::collections::HashMap;
use std::sync::Arc;

use archsim_model::behaviour::Behaviour;
use archsim_model::ids::{AssemblyContextId, RoleId, SignatureId};

/// The behaviour that implements an operation and the usage context it runs
/// in.
#[derive(Debug, Clone)]
pub struct ProvidedOperation {
    pub behaviour: Arc<Behaviour>,
    pub assembly: AssemblyContextId,
}

/// Maps a (role, signature) pair to the operation providing it.
#[derive(Debug, Default)]
pub struct Repository {
    operations: HashMap<(RoleId, SignatureId), ProvidedOperation>,
}

impl Repository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provided operation. A later registration for the same role and
    /// signature replaces the earlier one.
    #[must_use]
    pub fn with_operation(
        mut self,
        role: &str,
        signature: &str,
        behaviour: Arc<Behaviour>,
        assembly: &str,
    ) -> Self {
        self.provide(role, signature, behaviour, assembly);
        self
    }

    pub fn provide(
        &mut self,
        role: &str,
        signature: &str,
        behaviour: Arc<Behaviour>,
        assembly: &str,
    ) {
        self.operations.insert(
            (RoleId::new(role), SignatureId::new(signature)),
            ProvidedOperation {
                behaviour,
                assembly: AssemblyContextId::new(assembly),
            },
        );
    }

    #[must_use]
    pub fn lookup(&self, role: &RoleId, signature: &SignatureId) -> Option<&ProvidedOperation> {
        self.operations.get(&(role.clone(), signature.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_role_and_signature() {
        let repository = Repository::new()
            .with_operation("db", "query", Behaviour::empty("query"), "database")
            .with_operation("db", "update", Behaviour::empty("update"), "database");

        let found = repository
            .lookup(&RoleId::new("db"), &SignatureId::new("update"))
            .unwrap();
        assert_eq!(found.behaviour.name(), "update");
        assert_eq!(found.assembly.as_str(), "database");

        assert!(repository
            .lookup(&RoleId::new("database"), &SignatureId::new("query"))
            .is_none());
        assert_eq!(repository.len(), 2);
    }

    #[test]
    fn later_registration_wins() {
        let mut repository = Repository::new();
        repository.provide("db", "query", Behaviour::empty("old"), "a");
        repository.provide("db", "query", Behaviour::empty("new"), "b");

        let found = repository
            .lookup(&RoleId::new("db"), &SignatureId::new("query"))
            .unwrap();
        assert_eq!(found.behaviour.name(), "new");
        assert_eq!(repository.len(), 1);
    }
}
