// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A set of common traits used across the archsim engine.

use crate::events::Scheduled;
use crate::types::SimError;

/// Something that consumes events delivered by the [`Engine`](crate::engine)
/// and returns the follow-on events it wants scheduled.
///
/// Handlers never block: all state changes happen in place and any
/// continuation is expressed as a returned [`Scheduled`] event.
pub trait Handler<E> {
    fn handle(&mut self, now: f64, event: E) -> Result<Vec<Scheduled<E>>, SimError>;
}
