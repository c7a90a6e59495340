// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Events paired with the delay after which they should be delivered.

/// An event together with the delay (relative to the time it was produced)
/// at which it should be delivered.
#[derive(Clone, Debug, PartialEq)]
pub struct Scheduled<E> {
    pub event: E,
    pub delay: f64,
}

impl<E> Scheduled<E> {
    /// Deliver the event at the current time.
    #[must_use]
    pub fn now(event: E) -> Self {
        Self { event, delay: 0.0 }
    }

    /// Deliver the event after `delay` units of simulated time.
    #[must_use]
    pub fn after(event: E, delay: f64) -> Self {
        Self { event, delay }
    }

    /// Convert the event while keeping the delay.
    #[must_use]
    pub fn map<F>(self, f: impl FnOnce(E) -> F) -> Scheduled<F> {
        Scheduled {
            event: f(self.event),
            delay: self.delay,
        }
    }
}

/// Wrap each event of a `Vec` so that they are all delivered immediately.
#[must_use]
pub fn immediately<E>(events: Vec<E>) -> Vec<Scheduled<E>> {
    events.into_iter().map(Scheduled::now).collect()
}
