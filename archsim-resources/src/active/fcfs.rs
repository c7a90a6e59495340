// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! First-come-first-served scheduling.
//!
//! Jobs are served one at a time in arrival order. Only the job at the head
//! of the queue ever has a progression event outstanding.

use std::collections::VecDeque;
use std::sync::Arc;

use archsim_engine::events::Scheduled;
use archsim_engine::sim_error;
use archsim_engine::time::approx_zero_at;
use archsim_engine::types::SimError;
use archsim_track::entity::Entity;
use archsim_track::{enter, exit, trace};

use super::{ActiveResource, ResourceResult, progression};
use crate::events::ResourceEvent;
use crate::job::{Job, JobId, JobTarget};

pub struct Fcfs {
    pub entity: Arc<Entity>,
    target: JobTarget,
    queue: VecDeque<Job>,

    /// Time at which the head of the queue entered service.
    service_start: f64,
}

impl Fcfs {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, name: &str, target: JobTarget) -> Self {
        Self {
            entity: Arc::new(Entity::new(parent, name)),
            target,
            queue: VecDeque::new(),
            service_start: 0.0,
        }
    }

    /// Demand left for the head job at `now`, which must be `job`.
    fn head_remaining(&self, now: f64, job: JobId) -> Result<f64, SimError> {
        match self.queue.front() {
            Some(head) if head.id == job => Ok(head.demand - (now - self.service_start)),
            Some(head) => sim_error!(format!(
                "{}: progression for {job} but {} is in service",
                self.target, head.id
            )),
            None => sim_error!(format!("{}: progression for {job} on an empty queue", self.target)),
        }
    }

    fn start_next(&mut self, now: f64, events: &mut Vec<Scheduled<ResourceEvent>>) {
        if let Some(head) = self.queue.front() {
            trace!(self.entity ; "start {} (demand {:.3})", head.id, head.demand);
            self.service_start = now;
            events.push(progression(&self.target, head.id, None, head.demand));
        }
    }

    /// Keep the head job in service for a further `extra` time units.
    ///
    /// The head must have completed its current demand.
    pub fn extend_head(&mut self, now: f64, job: JobId, extra: f64) -> ResourceResult {
        let remaining = self.head_remaining(now, job)?;
        if !approx_zero_at(remaining, now) {
            return sim_error!(format!(
                "{}: cannot extend {job} with {remaining} demand remaining",
                self.target
            ));
        }
        if let Some(head) = self.queue.front_mut() {
            head.demand += extra;
        }
        trace!(self.entity ; "extend {} by {:.3}", job, extra);
        Ok(vec![progression(&self.target, job, None, extra)])
    }

    /// Remove the head job, which must be `job`, and start the next one.
    pub fn abort_head(&mut self, now: f64, job: JobId, reason: String) -> ResourceResult {
        self.head_remaining(now, job)?;
        let mut events = Vec::new();
        if let Some(aborted) = self.queue.pop_front() {
            exit!(self.entity ; aborted.tag);
            trace!(self.entity ; "abort {}: {}", aborted.id, reason);
            events.push(Scheduled::now(ResourceEvent::JobAborted {
                job: aborted,
                reason,
            }));
        }
        self.start_next(now, &mut events);
        Ok(events)
    }
}

impl ActiveResource for Fcfs {
    fn target(&self) -> &JobTarget {
        &self.target
    }

    fn on_job_initiated(&mut self, now: f64, job: Job) -> ResourceResult {
        enter!(self.entity ; job.tag);
        trace!(self.entity ; "queue {} (demand {:.3})", job.id, job.demand);
        self.queue.push_back(job);

        let mut events = Vec::new();
        if self.queue.len() == 1 {
            self.start_next(now, &mut events);
        }
        Ok(events)
    }

    fn on_job_progressed(&mut self, now: f64, job: JobId, _token: Option<u64>) -> ResourceResult {
        let remaining = self.head_remaining(now, job)?;
        if !approx_zero_at(remaining, now) {
            return sim_error!(format!(
                "{}: {job} progressed with {remaining} demand remaining",
                self.target
            ));
        }

        let mut events = Vec::new();
        if let Some(mut finished) = self.queue.pop_front() {
            exit!(self.entity ; finished.tag);
            trace!(self.entity ; "finish {}", finished.id);
            finished.demand = 0.0;
            events.push(Scheduled::now(ResourceEvent::JobFinished(finished)));
        }
        self.start_next(now, &mut events);
        Ok(events)
    }

    fn queue_length(&self) -> usize {
        self.queue.len()
    }

    fn drain(&mut self) -> Vec<Job> {
        self.queue.drain(..).collect()
    }
}
