// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Network links.
//!
//! A link serves messages first-come-first-served at its throughput. When a
//! message has been transmitted the link decides whether it was lost
//! (with the link's failure probability) and otherwise holds it for a drawn
//! latency before delivering it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use archsim_engine::time::EPSILON;
use archsim_model::ids::{LinkId, NodeId};
use archsim_model::topology::{LinkSpec, unit_interval};
use archsim_track::entity::Entity;
use archsim_track::{debug, trace};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::active::{ActiveResource, Fcfs, ResourceResult};
use crate::job::{Job, JobId, JobTarget};
use crate::resolution::Resolution;

pub struct LinkingResource {
    pub entity: Arc<Entity>,
    spec: LinkSpec,
    target: JobTarget,
    fcfs: Fcfs,
    latency_applied: HashSet<JobId>,
    rng: StdRng,
}

impl LinkingResource {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, spec: LinkSpec, seed: u64) -> Self {
        let entity = Arc::new(Entity::new(parent, spec.id.as_str()));
        let target = JobTarget::Linking(spec.id.clone());
        let fcfs = Fcfs::new(&entity, "queue", target.clone());
        Self {
            entity,
            spec,
            target,
            fcfs,
            latency_applied: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Time needed to transmit `bytes` over this link.
    #[must_use]
    pub fn transmission_time(&self, bytes: f64) -> f64 {
        bytes / self.spec.throughput
    }

    /// Override the failure probability of this link.
    pub fn set_failure_probability(&mut self, failure_probability: f64) {
        self.spec.failure_probability = failure_probability;
    }
}

impl ActiveResource for LinkingResource {
    fn target(&self) -> &JobTarget {
        &self.target
    }

    fn on_job_initiated(&mut self, now: f64, job: Job) -> ResourceResult {
        self.fcfs.on_job_initiated(now, job)
    }

    fn on_job_progressed(&mut self, now: f64, job: JobId, token: Option<u64>) -> ResourceResult {
        if self.latency_applied.remove(&job) {
            return self.fcfs.on_job_progressed(now, job, token);
        }

        let draw = unit_interval(&mut self.rng);
        if draw < self.spec.failure_probability {
            let reason = format!(
                "message lost on link {} (draw {draw:.3} < failure probability {})",
                self.spec.id, self.spec.failure_probability
            );
            debug!(self.entity ; "{}: {}", job, reason);
            return self.fcfs.abort_head(now, job, reason);
        }

        let latency = self.spec.latency.sample(&mut self.rng);
        if latency > EPSILON {
            trace!(self.entity ; "{} latency {:.3}", job, latency);
            self.latency_applied.insert(job);
            self.fcfs.extend_head(now, job, latency)
        } else {
            self.fcfs.on_job_progressed(now, job, token)
        }
    }

    fn queue_length(&self) -> usize {
        self.fcfs.queue_length()
    }

    fn drain(&mut self) -> Vec<Job> {
        self.latency_applied.clear();
        self.fcfs.drain()
    }
}

pub struct LinkingResourceTable {
    pub entity: Arc<Entity>,
    links: BTreeMap<LinkId, LinkingResource>,
    /// Nodes currently deployed, used to tell intact links from broken ones.
    nodes: BTreeSet<NodeId>,
}

impl LinkingResourceTable {
    #[must_use]
    pub fn new(parent: &Arc<Entity>) -> Self {
        Self {
            entity: Arc::new(Entity::new(parent, "links")),
            links: BTreeMap::new(),
            nodes: BTreeSet::new(),
        }
    }

    /// Add (or replace) a link. Jobs of a replaced link are returned.
    pub fn add_link(&mut self, spec: LinkSpec, seed: u64) -> Vec<Job> {
        let displaced = self.remove_link(&spec.id);
        debug!(self.entity ; "add link {}", spec.id);
        let id = spec.id.clone();
        self.links
            .insert(id, LinkingResource::new(&self.entity, spec, seed));
        displaced
    }

    pub fn remove_link(&mut self, id: &LinkId) -> Vec<Job> {
        match self.links.remove(id) {
            Some(mut link) => {
                debug!(self.entity ; "remove link {}", id);
                link.drain()
            }
            None => Vec::new(),
        }
    }

    pub fn node_added(&mut self, node: &NodeId) {
        self.nodes.insert(node.clone());
    }

    pub fn node_removed(&mut self, node: &NodeId) {
        self.nodes.remove(node);
    }

    fn is_intact(&self, link: &LinkingResource) -> bool {
        link.spec.endpoints.iter().all(|n| self.nodes.contains(n))
    }

    /// Find the link connecting `from` and `to`.
    ///
    /// A link whose endpoints include both nodes and are all deployed is
    /// preferred. Failing that, any link touching one of the two nodes is
    /// used.
    #[must_use]
    pub fn link_between(&self, from: &NodeId, to: &NodeId) -> Resolution<LinkId> {
        if let Some(link) = self
            .links
            .values()
            .find(|link| link.spec.connects(from, to) && self.is_intact(link))
        {
            return Resolution::Resolved(link.spec.id.clone());
        }

        if let Some(link) = self
            .links
            .values()
            .find(|link| link.spec.touches(from, to))
        {
            trace!(self.entity ; "no intact link {}-{}, using {}", from, to, link.spec.id);
            return Resolution::Resolved(link.spec.id.clone());
        }

        Resolution::NotFound(format!("no link between {from} and {to}"))
    }

    pub fn resolve(&mut self, id: &LinkId) -> Resolution<&mut LinkingResource> {
        match self.links.get_mut(id) {
            Some(link) => Resolution::Resolved(link),
            None => Resolution::NotFound(format!("no link {id}")),
        }
    }

    pub fn set_failure_probability(&mut self, failure_probability: f64) {
        for link in self.links.values_mut() {
            link.set_failure_probability(failure_probability);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
