// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Registry of the active resources deployed on each node.

use std::collections::BTreeMap;
use std::sync::Arc;

use archsim_model::ids::NodeId;
use archsim_model::topology::{ActiveResourceSpec, DeploymentNode, SchedulingPolicy};
use archsim_track::entity::Entity;
use archsim_track::debug;

use super::{ActiveResource, Delay, Fcfs, ProcessorSharing};
use crate::job::{ActiveResourceCompoundKey, Job, JobTarget};
use crate::resolution::Resolution;

pub struct ActiveResourceEntry {
    pub spec: ActiveResourceSpec,
    pub resource: Box<dyn ActiveResource>,
}

pub struct ActiveResourceTable {
    pub entity: Arc<Entity>,
    resources: BTreeMap<ActiveResourceCompoundKey, ActiveResourceEntry>,
}

fn create_resource(
    parent: &Arc<Entity>,
    key: &ActiveResourceCompoundKey,
    spec: &ActiveResourceSpec,
    seed: u64,
) -> Box<dyn ActiveResource> {
    let name = format!("{}_{}", key.node, key.resource_type);
    let target = JobTarget::Active(key.clone());
    match spec.policy {
        SchedulingPolicy::Fcfs => Box::new(Fcfs::new(parent, &name, target)),
        SchedulingPolicy::ProcessorSharing => Box::new(ProcessorSharing::new(
            parent,
            &name,
            target,
            spec.capacity,
            seed,
        )),
        SchedulingPolicy::Delay => Box::new(Delay::new(parent, &name, target)),
    }
}

impl ActiveResourceTable {
    #[must_use]
    pub fn new(parent: &Arc<Entity>) -> Self {
        Self {
            entity: Arc::new(Entity::new(parent, "active")),
            resources: BTreeMap::new(),
        }
    }

    /// Create the resources of `node`. Resources that already existed for
    /// the node are replaced and their jobs returned.
    pub fn add_node(&mut self, node: &DeploymentNode, mut next_seed: impl FnMut() -> u64) -> Vec<Job> {
        let displaced = self.remove_node(&node.id);
        for spec in &node.resources {
            let key = ActiveResourceCompoundKey::new(&node.id, &spec.resource_type);
            debug!(self.entity ; "add {:?} resource {}", spec.policy, key);
            let resource = create_resource(&self.entity, &key, spec, next_seed());
            self.resources.insert(
                key,
                ActiveResourceEntry {
                    spec: spec.clone(),
                    resource,
                },
            );
        }
        displaced
    }

    /// Remove all resources deployed on `node`, returning their jobs.
    pub fn remove_node(&mut self, node: &NodeId) -> Vec<Job> {
        let keys: Vec<ActiveResourceCompoundKey> = self
            .resources
            .keys()
            .filter(|key| &key.node == node)
            .cloned()
            .collect();

        let mut jobs = Vec::new();
        for key in keys {
            if let Some(mut entry) = self.resources.remove(&key) {
                debug!(self.entity ; "remove resource {}", key);
                jobs.extend(entry.resource.drain());
            }
        }
        jobs
    }

    pub fn resolve(&mut self, key: &ActiveResourceCompoundKey) -> Resolution<&mut ActiveResourceEntry> {
        match self.resources.get_mut(key) {
            Some(entry) => Resolution::Resolved(entry),
            None => Resolution::NotFound(format!("no active resource {key}")),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &ActiveResourceCompoundKey) -> bool {
        self.resources.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
