// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A minimal discrete-event kernel.
//!
//! The [`Engine`] owns the global event queue and simulated time. Events are
//! delivered to a [`Handler`] in non-decreasing time order; events scheduled
//! for the same time are delivered in the order they were scheduled.
//!
//! ```rust
//! use archsim_engine::engine::Engine;
//! use archsim_engine::events::Scheduled;
//! use archsim_engine::traits::Handler;
//! use archsim_engine::types::SimError;
//! use archsim_track::tracker::dev_null_tracker;
//!
//! struct Countdown(Vec<f64>);
//!
//! impl Handler<u32> for Countdown {
//!     fn handle(&mut self, now: f64, event: u32) -> Result<Vec<Scheduled<u32>>, SimError> {
//!         self.0.push(now);
//!         if event == 0 {
//!             Ok(Vec::new())
//!         } else {
//!             Ok(vec![Scheduled::after(event - 1, 1.5)])
//!         }
//!     }
//! }
//!
//! let mut engine = Engine::new(&dev_null_tracker());
//! engine.schedule(2, 0.0).unwrap();
//! let mut countdown = Countdown(Vec::new());
//! engine.run(&mut countdown).unwrap();
//! assert_eq!(countdown.0, vec![0.0, 1.5, 3.0]);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use archsim_track::entity::{Entity, toplevel};
use archsim_track::{Tracker, trace};

use crate::events::Scheduled;
use crate::sim_error;
use crate::time::SimTime;
use crate::traits::Handler;
use crate::types::{SimError, SimResult};

struct Pending<E> {
    time: f64,
    sequence: u64,
    event: E,
}

impl<E> PartialEq for Pending<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Pending<E> {}

impl<E> PartialOrd for Pending<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Pending<E> {
    // Reversed so that the `BinaryHeap` pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub struct Engine<E> {
    toplevel: Arc<Entity>,
    tracker: Tracker,
    time: SimTime,
    queue: BinaryHeap<Pending<E>>,
    sequence: u64,
    num_delivered: u64,
}

impl<E> Engine<E> {
    /// Create a standalone engine.
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        let time = SimTime::new(&toplevel);
        Self {
            toplevel,
            tracker: tracker.clone(),
            time,
            queue: BinaryHeap::new(),
            sequence: 0,
            num_delivered: 0,
        }
    }

    /// Schedule an event `delay` units after the current time.
    pub fn schedule(&mut self, event: E, delay: f64) -> SimResult {
        if !delay.is_finite() || delay < 0.0 {
            return sim_error!(format!("Invalid event delay {delay}"));
        }
        self.queue.push(Pending {
            time: self.time.now() + delay,
            sequence: self.sequence,
            event,
        });
        self.sequence += 1;
        Ok(())
    }

    pub fn schedule_all(&mut self, events: Vec<Scheduled<E>>) -> SimResult {
        for scheduled in events {
            self.schedule(scheduled.event, scheduled.delay)?;
        }
        Ok(())
    }

    /// Deliver the next event. Returns false once the queue is empty.
    pub fn step(&mut self, handler: &mut impl Handler<E>) -> Result<bool, SimError> {
        let Some(next) = self.queue.pop() else {
            return Ok(false);
        };
        self.time.advance_to(next.time);
        self.num_delivered += 1;
        let follow_on = handler.handle(self.time.now(), next.event)?;
        self.schedule_all(follow_on)?;
        Ok(true)
    }

    /// Run until there are no more events.
    pub fn run(&mut self, handler: &mut impl Handler<E>) -> SimResult {
        while self.step(handler)? {}
        trace!(self.toplevel ; "queue drained after {} events", self.num_delivered);
        Ok(())
    }

    /// Run until there are no more events or the next event is later than
    /// `end_time`. Time is left at `end_time` if the queue is not drained.
    pub fn run_until(&mut self, handler: &mut impl Handler<E>, end_time: f64) -> SimResult {
        while let Some(next) = self.queue.peek() {
            if next.time > end_time {
                self.time.advance_to(end_time);
                return Ok(());
            }
            self.step(handler)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn time_now(&self) -> f64 {
        self.time.now()
    }

    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn num_delivered(&self) -> u64 {
        self.num_delivered
    }

    #[must_use]
    pub fn top(&self) -> &Arc<Entity> {
        &self.toplevel
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}
