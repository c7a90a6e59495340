// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The resource-simulation coordinator.
//!
//! [`ResourceSimulation`] owns the active, passive and linking resource
//! tables. It turns demand requests, releases and network calls into jobs,
//! routes job lifecycle events to the resource serving the job, and
//! translates finished and aborted jobs back into the externally visible
//! events.
//!
//! Resources that cannot be resolved (for example because the node they were
//! deployed on has been removed) never cause an error: the affected job or
//! request is aborted with a reason instead.

use std::collections::HashMap;
use std::sync::Arc;

use archsim_engine::events::Scheduled;
use archsim_engine::sim_error;
use archsim_engine::traits::Handler;
use archsim_engine::types::SimError;
use archsim_model::expr::{Evaluate, ExprEvaluator};
use archsim_model::ids::{AssemblyContextId, NodeId};
use archsim_model::request::{Demand, PassiveRelease, ResourceDemandRequest};
use archsim_model::topology::{Topology, TopologyChange};
use archsim_track::entity::Entity;
use archsim_track::{create, create_tag, debug, destroy, error, trace, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::active::{ActiveResource, ActiveResourceTable, ResourceResult};
use crate::events::ResourceEvent;
use crate::job::{
    ActiveResourceCompoundKey, Job, JobId, JobOrigin, JobTarget, NetworkCall,
    PassiveResourceCompoundKey, WaitingJob,
};
use crate::linking::LinkingResourceTable;
use crate::passive::PassiveResourceTable;
use crate::resolution::Resolution;

pub struct ResourceSimulation {
    pub entity: Arc<Entity>,
    active: ActiveResourceTable,
    passive: PassiveResourceTable,
    links: LinkingResourceTable,
    allocations: HashMap<AssemblyContextId, NodeId>,

    /// Jobs admitted to a resource that have not finished or been aborted.
    in_flight: HashMap<JobId, Job>,

    evaluator: Box<dyn Evaluate>,
    seeds: StdRng,
    next_job: u64,
    link_failure_override: Option<f64>,
}

impl ResourceSimulation {
    /// Create the resources of `topology`.
    #[must_use]
    pub fn new(parent: &Arc<Entity>, topology: &Topology, seed: u64) -> Self {
        let entity = Arc::new(Entity::new(parent, "resources"));
        let mut simulation = Self {
            active: ActiveResourceTable::new(&entity),
            passive: PassiveResourceTable::new(&entity),
            links: LinkingResourceTable::new(&entity),
            entity,
            allocations: HashMap::new(),
            in_flight: HashMap::new(),
            evaluator: Box::new(ExprEvaluator),
            seeds: StdRng::seed_from_u64(seed),
            next_job: 0,
            link_failure_override: None,
        };

        for node in &topology.nodes {
            simulation.apply_topology_change(TopologyChange::NodeAdded(node.clone()));
        }
        for allocation in &topology.allocations {
            simulation.apply_topology_change(TopologyChange::AllocationChanged(allocation.clone()));
        }
        for link in &topology.links {
            simulation.apply_topology_change(TopologyChange::LinkAdded(link.clone()));
        }
        simulation
    }

    /// Use a different expression evaluator for demand amounts.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluate>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Force the failure probability of all current and future links.
    pub fn set_link_failure_probability(&mut self, failure_probability: f64) {
        self.link_failure_override = Some(failure_probability);
        self.links.set_failure_probability(failure_probability);
    }

    #[must_use]
    pub fn node_of(&self, context: &AssemblyContextId) -> Option<&NodeId> {
        self.allocations.get(context)
    }

    #[must_use]
    pub fn available(&self, key: &PassiveResourceCompoundKey) -> Option<u64> {
        self.passive.get(key).map(|resource| resource.available())
    }

    #[must_use]
    pub fn num_waiting(&self, key: &PassiveResourceCompoundKey) -> Option<usize> {
        self.passive.get(key).map(|resource| resource.num_waiting())
    }

    pub fn queue_length(&mut self, target: &JobTarget) -> Option<usize> {
        self.with_target(target, |resource| resource.queue_length()).ok()
    }

    #[must_use]
    pub fn num_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Handle one input or job lifecycle event.
    pub fn handle(&mut self, now: f64, event: ResourceEvent) -> ResourceResult {
        match event {
            ResourceEvent::DemandRequested(request) => Ok(self.on_demand_requested(request)),
            ResourceEvent::PassiveReleaseRequested(release) => self.on_passive_release(release),
            ResourceEvent::NetworkCallRequested(call) => Ok(self.on_network_call(call)),
            ResourceEvent::TopologyChanged(change) => Ok(self.apply_topology_change(change)),
            ResourceEvent::JobInitiated(job) => self.on_job_initiated(now, job),
            ResourceEvent::JobProgressed { target, job, token } => {
                self.on_job_progressed(now, &target, job, token)
            }
            ResourceEvent::JobFinished(job) => Ok(self.on_job_finished(job)),
            ResourceEvent::JobAborted { job, reason } => Ok(self.on_job_aborted(job, reason)),
            output => sim_error!(format!(
                "Output event {output:?} delivered to the resource simulation"
            )),
        }
    }

    fn with_target<R>(
        &mut self,
        target: &JobTarget,
        f: impl FnOnce(&mut dyn ActiveResource) -> R,
    ) -> Resolution<R> {
        match target {
            JobTarget::Active(key) => self.active.resolve(key).map(|entry| f(entry.resource.as_mut())),
            JobTarget::Linking(id) => self.links.resolve(id).map(|link| f(link)),
        }
    }

    fn new_job(&mut self, demand: f64, target: JobTarget, origin: JobOrigin) -> Job {
        let id = JobId(self.next_job);
        self.next_job += 1;
        let tag = create_tag!(self.entity);
        create!(self.entity ; tag, &id.to_string());
        Job {
            id,
            demand,
            target,
            origin,
            tag,
        }
    }

    fn demand_aborted(
        &self,
        request: ResourceDemandRequest,
        reason: String,
    ) -> Vec<Scheduled<ResourceEvent>> {
        debug!(self.entity ; "abort {}: {}", request, reason);
        vec![Scheduled::now(ResourceEvent::ResourceDemandAborted {
            request,
            reason,
        })]
    }

    fn abort_jobs(&mut self, jobs: Vec<Job>, reason: &str) -> Vec<Scheduled<ResourceEvent>> {
        jobs.into_iter()
            .map(|job| {
                self.in_flight.remove(&job.id);
                Scheduled::now(ResourceEvent::JobAborted {
                    job,
                    reason: reason.to_string(),
                })
            })
            .collect()
    }

    fn on_demand_requested(&mut self, request: ResourceDemandRequest) -> Vec<Scheduled<ResourceEvent>> {
        trace!(self.entity ; "demand {}", request);
        match request.demand.clone() {
            Demand::Active {
                resource_type,
                amount,
            } => {
                let amount = match self.evaluator.evaluate_f64(&amount, &request.bindings) {
                    Ok(amount) if amount.is_finite() && amount >= 0.0 => amount,
                    Ok(amount) => {
                        let reason = format!("invalid demand amount {amount}");
                        return self.demand_aborted(request, reason);
                    }
                    Err(e) => {
                        error!(self.entity ; "{}: {}", request, e);
                        return self.demand_aborted(request, e.to_string());
                    }
                };

                let Some(node) = self.allocations.get(&request.assembly) else {
                    let reason = format!("usage context {} is not allocated", request.assembly);
                    return self.demand_aborted(request, reason);
                };

                let key = ActiveResourceCompoundKey::new(node, &resource_type);
                let rate = match self.active.resolve(&key) {
                    Resolution::Resolved(entry) => entry.spec.processing_rate,
                    Resolution::NotFound(reason) => return self.demand_aborted(request, reason),
                };

                let job = self.new_job(
                    amount / rate,
                    JobTarget::Active(key),
                    JobOrigin::Demand(request),
                );
                vec![Scheduled::now(ResourceEvent::JobInitiated(job))]
            }
            Demand::Passive { semaphore, amount } => {
                let key = PassiveResourceCompoundKey::new(&semaphore, &request.assembly);
                let semaphore = match self.passive.resolve(&key) {
                    Resolution::Resolved(semaphore) => semaphore,
                    Resolution::NotFound(reason) => return self.demand_aborted(request, reason),
                };
                if amount > semaphore.capacity() {
                    let reason = format!(
                        "{amount} permits exceed the capacity {} of {key}",
                        semaphore.capacity()
                    );
                    return self.demand_aborted(request, reason);
                }

                let waiting = WaitingJob {
                    request,
                    key: key.clone(),
                    demand: amount,
                };
                match semaphore.acquire(waiting) {
                    Some(granted) => {
                        let available = semaphore.available();
                        vec![
                            Scheduled::now(ResourceEvent::PassiveResourceAcquired(granted)),
                            Scheduled::now(ResourceEvent::PassiveResourceStateUpdated {
                                key,
                                available,
                            }),
                        ]
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    fn on_passive_release(&mut self, release: PassiveRelease) -> ResourceResult {
        let key = PassiveResourceCompoundKey::new(&release.semaphore, &release.assembly);
        let semaphore = match self.passive.resolve(&key) {
            Resolution::Resolved(semaphore) => semaphore,
            Resolution::NotFound(reason) => {
                warn!(self.entity ; "release of {} permits ignored: {}", release.amount, reason);
                return Ok(Vec::new());
            }
        };

        let granted = semaphore.release(release.amount)?;
        let available = semaphore.available();
        let mut events = vec![Scheduled::now(ResourceEvent::PassiveResourceReleased(release))];
        events.extend(
            granted
                .into_iter()
                .map(|job| Scheduled::now(ResourceEvent::PassiveResourceAcquired(job))),
        );
        events.push(Scheduled::now(ResourceEvent::PassiveResourceStateUpdated {
            key,
            available,
        }));
        Ok(events)
    }

    fn on_network_call(&mut self, call: NetworkCall) -> Vec<Scheduled<ResourceEvent>> {
        if call.from == call.to {
            return vec![Scheduled::now(ResourceEvent::NetworkCallSucceeded(call))];
        }

        let link_id = match self.links.link_between(&call.from, &call.to) {
            Resolution::Resolved(link_id) => link_id,
            Resolution::NotFound(reason) => {
                debug!(self.entity ; "abort {}: {}", call, reason);
                return vec![Scheduled::now(ResourceEvent::NetworkCallAborted { call, reason })];
            }
        };
        let demand = match self.links.resolve(&link_id) {
            Resolution::Resolved(link) => link.transmission_time(call.bytes),
            Resolution::NotFound(reason) => {
                return vec![Scheduled::now(ResourceEvent::NetworkCallAborted { call, reason })];
            }
        };

        let job = self.new_job(demand, JobTarget::Linking(link_id), JobOrigin::Call(call));
        vec![Scheduled::now(ResourceEvent::JobInitiated(job))]
    }

    fn state_updated(target: JobTarget, queue_length: usize) -> Scheduled<ResourceEvent> {
        Scheduled::now(ResourceEvent::ActiveResourceStateUpdated {
            target,
            queue_length,
        })
    }

    fn on_job_initiated(&mut self, now: f64, job: Job) -> ResourceResult {
        self.in_flight.insert(job.id, job.clone());
        let target = job.target.clone();
        let snapshot = job.clone();
        let resolution = self.with_target(&target, |resource| {
            (
                resource.on_job_initiated(now, job),
                resource.queue_length(),
            )
        });
        match resolution {
            Resolution::Resolved((result, queue_length)) => {
                let mut events = result?;
                events.push(Self::state_updated(target, queue_length));
                Ok(events)
            }
            Resolution::NotFound(reason) => Ok(self.abort_jobs(vec![snapshot], &reason)),
        }
    }

    fn on_job_progressed(
        &mut self,
        now: f64,
        target: &JobTarget,
        job: JobId,
        token: Option<u64>,
    ) -> ResourceResult {
        if !self.in_flight.contains_key(&job) {
            trace!(self.entity ; "drop progression of retired {}", job);
            return Ok(Vec::new());
        }

        let resolution = self.with_target(target, |resource| {
            (
                resource.on_job_progressed(now, job, token),
                resource.queue_length(),
            )
        });
        match resolution {
            Resolution::Resolved((result, queue_length)) => {
                let mut events = result?;
                if !events.is_empty() {
                    events.push(Self::state_updated(target.clone(), queue_length));
                }
                Ok(events)
            }
            Resolution::NotFound(reason) => {
                let jobs: Vec<Job> = self.in_flight.remove(&job).into_iter().collect();
                Ok(self.abort_jobs(jobs, &reason))
            }
        }
    }

    fn on_job_finished(&mut self, job: Job) -> Vec<Scheduled<ResourceEvent>> {
        self.in_flight.remove(&job.id);
        destroy!(self.entity ; job.tag);
        trace!(self.entity ; "{} finished", job);
        let event = match job.origin {
            JobOrigin::Demand(request) => ResourceEvent::ResourceDemandSatisfied(request),
            JobOrigin::Call(call) => ResourceEvent::NetworkCallSucceeded(call),
        };
        vec![Scheduled::now(event)]
    }

    fn on_job_aborted(&mut self, job: Job, reason: String) -> Vec<Scheduled<ResourceEvent>> {
        self.in_flight.remove(&job.id);
        destroy!(self.entity ; job.tag);
        debug!(self.entity ; "{} aborted: {}", job, reason);
        let event = match job.origin {
            JobOrigin::Demand(request) => ResourceEvent::ResourceDemandAborted { request, reason },
            JobOrigin::Call(call) => ResourceEvent::NetworkCallAborted { call, reason },
        };
        vec![Scheduled::now(event)]
    }

    fn apply_topology_change(&mut self, change: TopologyChange) -> Vec<Scheduled<ResourceEvent>> {
        debug!(self.entity ; "topology change {:?}", change);
        match change {
            TopologyChange::NodeAdded(node) => {
                let seeds = &mut self.seeds;
                let displaced = self.active.add_node(&node, || seeds.next_u64());
                self.links.node_added(&node.id);
                let reason = format!("node {} was redeployed", node.id);
                self.abort_jobs(displaced, &reason)
            }
            TopologyChange::NodeRemoved(node) => {
                let jobs = self.active.remove_node(&node);
                self.links.node_removed(&node);
                let reason = format!("node {node} was removed");
                self.abort_jobs(jobs, &reason)
            }
            TopologyChange::AllocationChanged(allocation) => {
                self.allocations
                    .insert(allocation.context.clone(), allocation.node.clone());
                let waiting = self.passive.rebuild(&allocation);
                let reason = format!("semaphores of {} were rebuilt", allocation.context);
                waiting
                    .into_iter()
                    .flat_map(|job| self.demand_aborted(job.request, reason.clone()))
                    .collect()
            }
            TopologyChange::LinkAdded(mut link) => {
                if let Some(failure_probability) = self.link_failure_override {
                    link.failure_probability = failure_probability;
                }
                let reason = format!("link {} was replaced", link.id);
                let seed = self.seeds.next_u64();
                let displaced = self.links.add_link(link, seed);
                self.abort_jobs(displaced, &reason)
            }
            TopologyChange::LinkRemoved(link) => {
                let jobs = self.links.remove_link(&link);
                let reason = format!("link {link} was removed");
                self.abort_jobs(jobs, &reason)
            }
        }
    }
}

impl Handler<ResourceEvent> for ResourceSimulation {
    fn handle(
        &mut self,
        now: f64,
        event: ResourceEvent,
    ) -> Result<Vec<Scheduled<ResourceEvent>>, SimError> {
        ResourceSimulation::handle(self, now, event)
    }
}
