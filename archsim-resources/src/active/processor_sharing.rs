// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Processor-sharing scheduling.
//!
//! All running jobs share the `capacity` cores. While there are no more
//! jobs than cores each job runs at full speed; beyond that every job is
//! slowed down by the factor `running / capacity`.
//!
//! Only the job with the least remaining demand has a progression event
//! scheduled. Every reschedule draws a new random state token; progression
//! events carrying an older token are stale and are dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use archsim_engine::events::Scheduled;
use archsim_engine::sim_error;
use archsim_track::entity::Entity;
use archsim_track::{enter, exit, trace};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use super::{ActiveResource, ResourceResult, progression};
use crate::events::ResourceEvent;
use crate::job::{Job, JobId, JobTarget};

/// The smallest demand a job can have on a processor-sharing resource.
pub const JIFFY: f64 = 1e-9;

/// Number of jobs each core is running.
///
/// With fewer jobs than cores every job has a core of its own. Otherwise
/// the jobs are spread evenly and the first `running % capacity` cores run
/// one job more.
#[must_use]
pub fn slot_distribution(running: usize, capacity: usize) -> Vec<usize> {
    if running < capacity {
        (0..capacity).map(|core| usize::from(core < running)).collect()
    } else {
        let per_core = running / capacity;
        let remainder = running % capacity;
        (0..capacity)
            .map(|core| per_core + usize::from(core < remainder))
            .collect()
    }
}

pub struct ProcessorSharing {
    pub entity: Arc<Entity>,
    target: JobTarget,
    capacity: usize,
    running: BTreeMap<JobId, Job>,
    slots: Vec<usize>,
    last_update: f64,
    token: u64,
    rng: StdRng,
}

impl ProcessorSharing {
    #[must_use]
    pub fn new(
        parent: &Arc<Entity>,
        name: &str,
        target: JobTarget,
        capacity: usize,
        seed: u64,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            entity: Arc::new(Entity::new(parent, name)),
            target,
            capacity,
            running: BTreeMap::new(),
            slots: vec![0; capacity],
            last_update: 0.0,
            token: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn speed_factor(&self) -> f64 {
        (self.running.len() as f64 / self.capacity as f64).max(1.0)
    }

    #[must_use]
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    #[must_use]
    pub fn remaining_demand(&self, job: JobId) -> Option<f64> {
        self.running.get(&job).map(|j| j.demand)
    }

    /// Account for the service the running jobs received since the last
    /// update.
    fn update_demands(&mut self, now: f64) {
        let elapsed = now - self.last_update;
        if elapsed > 0.0 && !self.running.is_empty() {
            let served = elapsed / self.speed_factor();
            for job in self.running.values_mut() {
                job.demand = (job.demand - served).max(0.0);
            }
        }
        self.last_update = now;
    }

    fn shortest(&self) -> Option<&Job> {
        self.running
            .values()
            .min_by(|a, b| a.demand.total_cmp(&b.demand).then(a.id.cmp(&b.id)))
    }

    fn schedule_next(&mut self, events: &mut Vec<Scheduled<ResourceEvent>>) {
        self.token = self.rng.next_u64();
        let speed = self.speed_factor();
        if let Some(next) = self.shortest() {
            let delay = next.demand * speed;
            trace!(self.entity ; "next {} in {:.3} (speed {:.3})", next.id, delay, speed);
            events.push(progression(&self.target, next.id, Some(self.token), delay));
        }
    }
}

impl ActiveResource for ProcessorSharing {
    fn target(&self) -> &JobTarget {
        &self.target
    }

    fn on_job_initiated(&mut self, now: f64, mut job: Job) -> ResourceResult {
        self.update_demands(now);

        enter!(self.entity ; job.tag);
        job.demand = job.demand.max(JIFFY);
        trace!(self.entity ; "start {} (demand {:.3})", job.id, job.demand);
        self.running.insert(job.id, job);
        self.slots = slot_distribution(self.running.len(), self.capacity);

        let mut events = Vec::new();
        self.schedule_next(&mut events);
        Ok(events)
    }

    fn on_job_progressed(&mut self, now: f64, job: JobId, token: Option<u64>) -> ResourceResult {
        if token != Some(self.token) {
            trace!(self.entity ; "drop stale progression of {}", job);
            return Ok(Vec::new());
        }

        self.update_demands(now);
        let Some(mut finished) = self.running.remove(&job) else {
            return sim_error!(format!("{}: progression for unknown {job}", self.target));
        };
        exit!(self.entity ; finished.tag);
        trace!(self.entity ; "finish {}", finished.id);
        finished.demand = 0.0;
        self.slots = slot_distribution(self.running.len(), self.capacity);

        let mut events = vec![Scheduled::now(ResourceEvent::JobFinished(finished))];
        self.schedule_next(&mut events);
        Ok(events)
    }

    fn queue_length(&self) -> usize {
        self.running.len()
    }

    fn drain(&mut self) -> Vec<Job> {
        // Invalidate any outstanding progression.
        self.token = self.rng.next_u64();
        self.slots = vec![0; self.capacity];
        std::mem::take(&mut self.running).into_values().collect()
    }
}
