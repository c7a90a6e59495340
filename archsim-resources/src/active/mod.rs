// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Active resources and their scheduling policies.
//!
//! Every policy implements the [`ActiveResource`] trait and is stored behind
//! a `Box<dyn ActiveResource>` in the [`ActiveResourceTable`]. A policy
//! reacts to two events: a job being initiated on it, and a progression event
//! it scheduled for itself earlier.

use archsim_engine::events::Scheduled;
use archsim_engine::types::SimError;

use crate::events::ResourceEvent;
use crate::job::{Job, JobId, JobTarget};

pub mod delay;
pub mod fcfs;
pub mod processor_sharing;
pub mod table;

pub use delay::Delay;
pub use fcfs::Fcfs;
pub use processor_sharing::ProcessorSharing;
pub use table::{ActiveResourceEntry, ActiveResourceTable};

/// Events produced by a resource in response to a job lifecycle event.
pub type ResourceResult = Result<Vec<Scheduled<ResourceEvent>>, SimError>;

pub trait ActiveResource {
    fn target(&self) -> &JobTarget;

    /// Accept a newly initiated job.
    fn on_job_initiated(&mut self, now: f64, job: Job) -> ResourceResult;

    /// Advance upon a progression event previously scheduled by this
    /// resource.
    fn on_job_progressed(&mut self, now: f64, job: JobId, token: Option<u64>) -> ResourceResult;

    /// Number of jobs queued or in service.
    fn queue_length(&self) -> usize;

    /// Remove every job from the resource.
    fn drain(&mut self) -> Vec<Job>;
}

pub(crate) fn progression(
    target: &JobTarget,
    job: JobId,
    token: Option<u64>,
    delay: f64,
) -> Scheduled<ResourceEvent> {
    Scheduled::after(
        ResourceEvent::JobProgressed {
            target: target.clone(),
            job,
            token,
        },
        delay,
    )
}
