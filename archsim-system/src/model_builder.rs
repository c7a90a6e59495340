// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A small three-tier system used by the `archsim` binary.
//!
//! ```text
//!   users -> webserver [frontend] --lan--> application, middleware [backend]
//!                                            --san--> database [storage]
//! ```
//!
//! A web request parses its input, calls the application and returns. The
//! application looks up `items` entries (most of which hit a cache, the rest
//! query the database), scores the result in parallel with an audit query
//! and renders a response through the middleware.

use std::sync::Arc;

use archsim_engine::types::SimError;
use archsim_model::behaviour::{
    ActionKind, Behaviour, BranchTransition, InfrastructureCall, ParametricDemand,
};
use archsim_model::expr::{BinaryOp, Expr, Value};
use archsim_model::topology::{
    ActiveResourceSpec, Allocation, DeploymentNode, Latency, LinkSpec, SchedulingPolicy,
    SemaphoreSpec, Topology,
};

use crate::repository::Repository;
use crate::workload::Workload;

pub const CACHE_HIT_PROBABILITY: f64 = 0.7;
pub const ITEMS_PER_REQUEST: i64 = 3;

pub struct ThreeTier {
    pub topology: Topology,
    pub repository: Repository,
    pub workload: Workload,
}

fn topology(link_failure_probability: f64) -> Result<Topology, SimError> {
    let frontend = DeploymentNode::new(
        "frontend",
        vec![ActiveResourceSpec::new(
            "CPU",
            SchedulingPolicy::ProcessorSharing,
            2,
            1.0,
        )?],
    );
    let backend = DeploymentNode::new(
        "backend",
        vec![ActiveResourceSpec::new(
            "CPU",
            SchedulingPolicy::ProcessorSharing,
            4,
            1.0,
        )?],
    );
    let storage = DeploymentNode::new(
        "storage",
        vec![
            ActiveResourceSpec::new("CPU", SchedulingPolicy::Fcfs, 1, 2.0)?,
            ActiveResourceSpec::new("HDD", SchedulingPolicy::Fcfs, 1, 1.0)?,
        ],
    );

    Ok(Topology::new()
        .with_node(frontend)
        .with_node(backend)
        .with_node(storage)
        .with_allocation(Allocation::new(
            "webserver",
            "frontend",
            vec![SemaphoreSpec::new("threads", 8)],
        ))
        .with_allocation(Allocation::new("application", "backend", Vec::new()))
        .with_allocation(Allocation::new("middleware", "backend", Vec::new()))
        .with_allocation(Allocation::new(
            "database",
            "storage",
            vec![SemaphoreSpec::new("connections", 4)],
        ))
        .with_link(LinkSpec::new(
            "lan",
            &["frontend", "backend"],
            1024.0,
            Latency::Fixed(0.5),
            link_failure_probability,
        )?)
        .with_link(LinkSpec::new(
            "san",
            &["backend", "storage"],
            4096.0,
            Latency::Exponential { mean: 0.25 },
            link_failure_probability,
        )?))
}

fn web_request() -> Arc<Behaviour> {
    Behaviour::sequence(
        "web request",
        vec![
            ("take thread", ActionKind::acquire("threads", 1)),
            ("parse", ActionKind::demand("CPU", Expr::double(1.0))),
            (
                "process",
                ActionKind::ExternalCall {
                    role: "app".into(),
                    signature: "process".into(),
                    inputs: vec![("items".to_string(), Expr::var("items"))],
                },
            ),
            ("return thread", ActionKind::release("threads", 1)),
        ],
    )
}

fn process() -> Arc<Behaviour> {
    let lookup = Behaviour::sequence(
        "lookup",
        vec![(
            "cache",
            ActionKind::Branch {
                transitions: vec![
                    BranchTransition::Probabilistic {
                        probability: CACHE_HIT_PROBABILITY,
                        body: Behaviour::sequence(
                            "hit",
                            vec![("read cache", ActionKind::demand("CPU", Expr::double(0.5)))],
                        ),
                    },
                    BranchTransition::Probabilistic {
                        probability: 1.0 - CACHE_HIT_PROBABILITY,
                        body: Behaviour::sequence(
                            "miss",
                            vec![("query", ActionKind::external_call("db", "query"))],
                        ),
                    },
                ],
            },
        )],
    );

    let mut marshal = InfrastructureCall::new("middleware", "marshal", Expr::int(2));
    marshal
        .inputs
        .push(("bytes".to_string(), Expr::int(1024)));

    Behaviour::sequence(
        "process",
        vec![
            (
                "validate",
                ActionKind::demand(
                    "CPU",
                    Expr::binary(BinaryOp::Mul, Expr::double(0.5), Expr::var("items")),
                ),
            ),
            (
                "lookups",
                ActionKind::Loop {
                    iterations: Expr::var("items"),
                    body: lookup,
                },
            ),
            (
                "score and audit",
                ActionKind::Fork {
                    synchronised: vec![
                        Behaviour::sequence(
                            "score",
                            vec![("score", ActionKind::demand("CPU", Expr::double(1.0)))],
                        ),
                        Behaviour::sequence(
                            "audit",
                            vec![("audit", ActionKind::external_call("db", "query"))],
                        ),
                    ],
                },
            ),
            (
                "render",
                ActionKind::InternalAction {
                    demands: vec![ParametricDemand::new("CPU", Expr::double(1.0))],
                    infrastructure_calls: vec![marshal],
                },
            ),
        ],
    )
}

fn query() -> Arc<Behaviour> {
    Behaviour::sequence(
        "query",
        vec![
            ("connect", ActionKind::acquire("connections", 1)),
            ("plan", ActionKind::demand("CPU", Expr::double(1.0))),
            ("read", ActionKind::demand("HDD", Expr::double(2.0))),
            ("disconnect", ActionKind::release("connections", 1)),
        ],
    )
}

fn marshal() -> Arc<Behaviour> {
    Behaviour::sequence(
        "marshal",
        vec![(
            "encode",
            ActionKind::demand(
                "CPU",
                Expr::binary(BinaryOp::Div, Expr::var("bytes"), Expr::double(4096.0)),
            ),
        )],
    )
}

/// Build the three-tier system with a closed workload of `num_users` users.
pub fn build_three_tier(
    num_users: usize,
    think_time: f64,
    link_failure_probability: f64,
) -> Result<ThreeTier, SimError> {
    let repository = Repository::new()
        .with_operation("app", "process", process(), "application")
        .with_operation("db", "query", query(), "database")
        .with_operation("middleware", "marshal", marshal(), "middleware");

    let workload = Workload::closed(web_request(), "webserver", num_users, think_time)?
        .with_input("items", Value::Int(ITEMS_PER_REQUEST));

    Ok(ThreeTier {
        topology: topology(link_failure_probability)?,
        repository,
        workload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_assembly_is_allocated() {
        let system = build_three_tier(1, 0.0, 0.0).unwrap();
        for assembly in ["webserver", "application", "middleware", "database"] {
            assert!(system.topology.node_of(&assembly.into()).is_some(), "{assembly}");
        }
        assert_eq!(system.repository.len(), 3);
    }

    #[test]
    fn invalid_failure_probability_is_rejected() {
        assert!(build_three_tier(1, 0.0, 1.5).is_err());
    }
}
