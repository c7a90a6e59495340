// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Passive resources: counting semaphores with a strict FIFO wait queue.
//!
//! A request is only granted when it is at the head of the queue (or the
//! queue is empty) and enough permits are available. A small request never
//! overtakes a larger one that arrived earlier.
//!
//! When an allocation change replaces a semaphore, permits still held from
//! the old instance are carried over as orphaned permits. Releasing them
//! later returns them to nobody instead of to the new instance.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use archsim_engine::sim_error;
use archsim_engine::types::SimError;
use archsim_model::ids::AssemblyContextId;
use archsim_model::topology::Allocation;
use archsim_track::entity::Entity;
use archsim_track::{debug, trace, warn};

use crate::job::{PassiveResourceCompoundKey, WaitingJob};
use crate::resolution::Resolution;

pub struct PassiveResource {
    pub entity: Arc<Entity>,
    key: PassiveResourceCompoundKey,
    capacity: u64,
    available: u64,
    queue: VecDeque<WaitingJob>,

    /// Permits granted by replaced instances and not yet released.
    orphaned: u64,
}

impl PassiveResource {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, key: PassiveResourceCompoundKey, capacity: u64) -> Self {
        let name = format!("{}_{}", key.context, key.semaphore);
        Self {
            entity: Arc::new(Entity::new(parent, &name)),
            key,
            capacity,
            available: capacity,
            queue: VecDeque::new(),
            orphaned: 0,
        }
    }

    #[must_use]
    pub fn with_orphaned(mut self, orphaned: u64) -> Self {
        self.orphaned = orphaned;
        self
    }

    #[must_use]
    pub fn key(&self) -> &PassiveResourceCompoundKey {
        &self.key
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[must_use]
    pub fn available(&self) -> u64 {
        self.available
    }

    /// Permits currently granted by this instance.
    #[must_use]
    pub fn in_use(&self) -> u64 {
        self.capacity - self.available
    }

    #[must_use]
    pub fn orphaned(&self) -> u64 {
        self.orphaned
    }

    #[must_use]
    pub fn num_waiting(&self) -> usize {
        self.queue.len()
    }

    /// A job can be granted if nobody is queued ahead of it and enough
    /// permits are free.
    #[must_use]
    pub fn acquirable(&self, job: &WaitingJob) -> bool {
        let first_in_line = match self.queue.front() {
            None => true,
            Some(head) => head.request.id == job.request.id,
        };
        first_in_line && job.demand <= self.available
    }

    fn grant(&mut self, job: &WaitingJob) {
        self.available -= job.demand;
        trace!(self.entity ; "grant {} ({} left)", job, self.available);
    }

    /// Try to acquire permits. Returns the job if it was granted, otherwise
    /// the job is queued.
    pub fn acquire(&mut self, job: WaitingJob) -> Option<WaitingJob> {
        if self.acquirable(&job) {
            self.grant(&job);
            Some(job)
        } else {
            trace!(self.entity ; "queue {}", job);
            self.queue.push_back(job);
            None
        }
    }

    /// Return `amount` permits and grant queued jobs in order for as long as
    /// the head of the queue can be satisfied.
    ///
    /// Permits beyond those granted by this instance are taken from the
    /// orphaned permits. Releasing more than both is an error.
    pub fn release(&mut self, amount: u64) -> Result<Vec<WaitingJob>, SimError> {
        let from_replaced = amount.saturating_sub(self.in_use());
        if from_replaced > self.orphaned {
            return sim_error!(format!(
                "{}: releasing {amount} would exceed capacity {} ({} available)",
                self.key, self.capacity, self.available
            ));
        }
        if from_replaced > 0 {
            warn!(self.entity ; "{} permits returned to a replaced instance", from_replaced);
            self.orphaned -= from_replaced;
        }
        self.available += amount - from_replaced;
        trace!(self.entity ; "release {} ({} available)", amount, self.available);

        let mut granted = Vec::new();
        while let Some(head) = self.queue.front() {
            if head.demand > self.available {
                break;
            }
            if let Some(job) = self.queue.pop_front() {
                self.grant(&job);
                granted.push(job);
            }
        }
        Ok(granted)
    }

    /// Remove all waiting jobs.
    pub fn drain(&mut self) -> Vec<WaitingJob> {
        self.queue.drain(..).collect()
    }
}

/// Semaphores keyed by definition and usage context.
pub struct PassiveResourceTable {
    pub entity: Arc<Entity>,
    resources: BTreeMap<PassiveResourceCompoundKey, PassiveResource>,
}

impl PassiveResourceTable {
    #[must_use]
    pub fn new(parent: &Arc<Entity>) -> Self {
        Self {
            entity: Arc::new(Entity::new(parent, "passive")),
            resources: BTreeMap::new(),
        }
    }

    /// Replace every semaphore of the allocation's usage context by fresh
    /// instances. Jobs waiting on replaced semaphores are returned.
    ///
    /// Permits still held from a replaced instance become orphaned permits
    /// of the instance replacing it.
    pub fn rebuild(&mut self, allocation: &Allocation) -> Vec<WaitingJob> {
        let (waiting, mut held) = self.remove_context(&allocation.context);
        for spec in &allocation.semaphores {
            let key = PassiveResourceCompoundKey::new(&spec.id, &allocation.context);
            let orphaned = held.remove(&key).unwrap_or(0);
            debug!(self.entity ; "add semaphore {} (capacity {}, {} orphaned)",
                key, spec.capacity, orphaned);
            let resource = PassiveResource::new(&self.entity, key.clone(), spec.capacity)
                .with_orphaned(orphaned);
            self.resources.insert(key, resource);
        }
        waiting
    }

    /// Remove the semaphores of `context`. Returns the jobs that were
    /// waiting and the permits still held per semaphore.
    fn remove_context(
        &mut self,
        context: &AssemblyContextId,
    ) -> (Vec<WaitingJob>, BTreeMap<PassiveResourceCompoundKey, u64>) {
        let keys: Vec<PassiveResourceCompoundKey> = self
            .resources
            .keys()
            .filter(|key| &key.context == context)
            .cloned()
            .collect();

        let mut waiting = Vec::new();
        let mut held = BTreeMap::new();
        for key in keys {
            if let Some(mut resource) = self.resources.remove(&key) {
                debug!(self.entity ; "remove semaphore {}", key);
                waiting.extend(resource.drain());
                held.insert(key, resource.in_use() + resource.orphaned());
            }
        }
        (waiting, held)
    }

    pub fn resolve(&mut self, key: &PassiveResourceCompoundKey) -> Resolution<&mut PassiveResource> {
        match self.resources.get_mut(key) {
            Some(resource) => Resolution::Resolved(resource),
            None => Resolution::NotFound(format!("no semaphore {key}")),
        }
    }

    #[must_use]
    pub fn get(&self, key: &PassiveResourceCompoundKey) -> Option<&PassiveResource> {
        self.resources.get(key)
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
