// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The minimal model types consumed by the archsim resource and behaviour
//! simulations:
//!
//!  - [identifiers](crate::ids) of model elements,
//!  - [expressions](crate::expr) and the bindings they are evaluated against,
//!  - the deployment [topology](crate::topology),
//!  - [behaviour graphs](crate::behaviour),
//!  - the [requests](crate::request) passed from behaviour to resources.

pub mod behaviour;
pub mod expr;
pub mod ids;
pub mod request;
pub mod topology;
