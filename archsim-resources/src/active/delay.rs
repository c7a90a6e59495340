// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Infinite-server scheduling: every job is delayed by its own demand,
//! independent of any other job.

use std::collections::HashMap;
use std::sync::Arc;

use archsim_engine::events::Scheduled;
use archsim_engine::sim_error;
use archsim_track::entity::Entity;
use archsim_track::{enter, exit, trace};

use super::{ActiveResource, ResourceResult, progression};
use crate::events::ResourceEvent;
use crate::job::{Job, JobId, JobTarget};

pub struct Delay {
    pub entity: Arc<Entity>,
    target: JobTarget,
    jobs: HashMap<JobId, Job>,
}

impl Delay {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, name: &str, target: JobTarget) -> Self {
        Self {
            entity: Arc::new(Entity::new(parent, name)),
            target,
            jobs: HashMap::new(),
        }
    }
}

impl ActiveResource for Delay {
    fn target(&self) -> &JobTarget {
        &self.target
    }

    fn on_job_initiated(&mut self, _now: f64, job: Job) -> ResourceResult {
        enter!(self.entity ; job.tag);
        trace!(self.entity ; "delay {} by {:.3}", job.id, job.demand);
        let event = progression(&self.target, job.id, None, job.demand);
        self.jobs.insert(job.id, job);
        Ok(vec![event])
    }

    fn on_job_progressed(&mut self, _now: f64, job: JobId, _token: Option<u64>) -> ResourceResult {
        let Some(mut finished) = self.jobs.remove(&job) else {
            return sim_error!(format!("{}: progression for unknown {job}", self.target));
        };
        exit!(self.entity ; finished.tag);
        finished.demand = 0.0;
        Ok(vec![Scheduled::now(ResourceEvent::JobFinished(finished))])
    }

    fn queue_length(&self) -> usize {
        self.jobs.len()
    }

    fn drain(&mut self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.drain().map(|(_, job)| job).collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }
}
