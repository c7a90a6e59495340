// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::Tag;
use crate::tracker::{EntityManager, Track};

/// A [`Track`] event.
#[derive(Debug, Clone)]
pub struct EventCommon {
    /// The [`Tag`](crate::Tag) of the event originator.
    pub tag: Tag,

    /// The time at which the event occurred.
    pub time: f64,

    /// Any event-specific state.
    pub event: Event,
}

impl EventCommon {
    fn new(tag: Tag, time: f64, event: Event) -> Self {
        Self { tag, time, event }
    }
}

/// The event-specific part of an [`EventCommon`].
#[derive(Debug, Clone)]
pub enum Event {
    /// An object was created.
    Create {
        /// Tag of the created object.
        created: Tag,
    },
    /// An object was destroyed.
    Destroy {
        /// Tag of the destroyed object.
        destroyed: Tag,
    },
    /// A log message.
    Log {
        /// Level of the message.
        level: log::Level,
        /// Formatted text.
        text: String,
    },
    /// An object entered the entity.
    Enter {
        /// Tag of the object.
        entered: Tag,
    },
    /// An object left the entity.
    Exit {
        /// Tag of the object.
        exited: Tag,
    },
}

struct TrackedState {
    events: Vec<EventCommon>,
    name_to_tag: HashMap<String, Tag>,
}

impl TrackedState {
    fn new() -> Self {
        Self {
            events: Vec::with_capacity(INITIAL_CAPACITY),
            name_to_tag: HashMap::with_capacity(INITIAL_CAPACITY),
        }
    }

    fn count_enter(&self, tag: Tag) -> usize {
        self.events
            .iter()
            .filter(|e| e.tag == tag)
            .filter(|e| matches!(e.event, Event::Enter { entered: _ }))
            .count()
    }

    fn count_exit(&self, tag: Tag) -> usize {
        self.events
            .iter()
            .filter(|e| e.tag == tag)
            .filter(|e| matches!(e.event, Event::Exit { exited: _ }))
            .count()
    }

    /// Number of objects that have entered but not yet exited.
    fn occupancy(&self, tag: Tag) -> usize {
        self.count_enter(tag).saturating_sub(self.count_exit(tag))
    }
}

/// A tracker that keeps all events in memory so that they can be queried
/// after (or during) a simulation.
pub struct InMemoryTracker {
    entity_manager: EntityManager,
    state: Mutex<TrackedState>,
}

const INITIAL_CAPACITY: usize = 1024;

impl InMemoryTracker {
    /// Create a new [`InMemoryTracker`] with an [`EntityManager`].
    pub fn new(entity_manager: EntityManager) -> Self {
        Self {
            entity_manager,
            state: Mutex::new(TrackedState::new()),
        }
    }

    fn add_event(&self, event: EventCommon) {
        let mut state_guard = self.state.lock().unwrap();
        state_guard.events.push(event);
    }

    /// Get the [`Tag`] for the specified simulation entity.
    pub fn tag_for_name(&self, name: &str) -> Option<Tag> {
        let state_guard = self.state.lock().unwrap();
        state_guard.name_to_tag.get(name).copied()
    }

    /// Return the number of objects that entered the entity specified by `tag`.
    pub fn count_enter(&self, tag: Tag) -> usize {
        let state_guard = self.state.lock().unwrap();
        state_guard.count_enter(tag)
    }

    /// Return the number of objects that exited the entity specified by `tag`.
    pub fn count_exit(&self, tag: Tag) -> usize {
        let state_guard = self.state.lock().unwrap();
        state_guard.count_exit(tag)
    }

    /// Return the number of objects currently inside the entity.
    pub fn occupancy(&self, tag: Tag) -> usize {
        let state_guard = self.state.lock().unwrap();
        state_guard.occupancy(tag)
    }

    /// Return the log messages emitted by the entity specified by `tag`.
    pub fn log_messages(&self, tag: Tag) -> Vec<String> {
        let state_guard = self.state.lock().unwrap();
        state_guard
            .events
            .iter()
            .filter(|e| e.tag == tag)
            .filter_map(|e| match &e.event {
                Event::Log { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Return a copy of every event recorded so far.
    pub fn events(&self) -> Vec<EventCommon> {
        self.state.lock().unwrap().events.clone()
    }
}

/// Implementation each [`Track`] event
impl Track for InMemoryTracker {
    fn unique_tag(&self) -> Tag {
        self.entity_manager.unique_tag()
    }

    fn is_entity_enabled(&self, tag: Tag, level: log::Level) -> bool {
        self.entity_manager.is_enabled(tag, level)
    }

    fn add_entity(&self, tag: Tag, entity_name: &str) {
        self.entity_manager.add_entity(tag, entity_name);
        let mut state_guard = self.state.lock().unwrap();
        state_guard.name_to_tag.insert(entity_name.to_owned(), tag);
    }

    fn enter(&self, tag: Tag, object: Tag) {
        let time = self.entity_manager.time();
        self.add_event(EventCommon::new(tag, time, Event::Enter { entered: object }));
    }

    fn exit(&self, tag: Tag, object: Tag) {
        let time = self.entity_manager.time();
        self.add_event(EventCommon::new(tag, time, Event::Exit { exited: object }));
    }

    fn create(&self, created_by: Tag, tag: Tag, _name: &str) {
        let time = self.entity_manager.time();
        self.add_event(EventCommon::new(
            created_by,
            time,
            Event::Create { created: tag },
        ));
    }

    fn destroy(&self, destroyed_by: Tag, tag: Tag) {
        let time = self.entity_manager.time();
        self.add_event(EventCommon::new(
            destroyed_by,
            time,
            Event::Destroy { destroyed: tag },
        ));
    }

    fn log(&self, tag: Tag, level: log::Level, msg: std::fmt::Arguments) {
        let time = self.entity_manager.time();
        let log = Event::Log {
            level,
            text: format!("{msg}"),
        };
        self.add_event(EventCommon::new(tag, time, log));
    }

    fn time(&self, _set_by: Tag, time: f64) {
        self.entity_manager.set_time(time);
    }

    fn shutdown(&self) {
        // Do nothing
    }
}
