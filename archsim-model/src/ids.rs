// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Identifiers of model elements.
//!
//! Every model element is referred to by a string identifier wrapped in its
//! own type so that, for example, a node identifier can never be used to look
//! up a semaphore. Identifiers compare structurally.

use std::fmt;

macro_rules! model_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(id: &str) -> Self {
                Self(id.to_string())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

model_id!(
    /// A deployment node (the place active resources are deployed to).
    NodeId
);
model_id!(
    /// A type of active resource (e.g. CPU, HDD).
    ResourceTypeId
);
model_id!(
    /// A semaphore (passive resource) definition.
    SemaphoreId
);
model_id!(
    /// A usage context: one deployed instance of a component.
    AssemblyContextId
);
model_id!(
    /// A network link between deployment nodes.
    LinkId
);
model_id!(
    /// A role through which a component provides or requires operations.
    RoleId
);
model_id!(
    /// An operation signature within a role.
    SignatureId
);

/// Position of an action within its behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub usize);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn ids_compare_by_value() {
        let a = NodeId::new("server");
        let b: NodeId = "server".into();
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
        assert_eq!(b.to_string(), "server");
    }
}
