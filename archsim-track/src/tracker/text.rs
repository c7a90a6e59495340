// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::tracker::{EntityManager, Track};
use crate::{SharedWriter, Tag, Writer};

/// A simple text logger to output messages to a Writer.
pub struct TextTracker {
    entity_manager: EntityManager,

    /// Writer to which all _log_ events will be written.
    writer: SharedWriter,
}

impl TextTracker {
    /// Create a new [`TextTracker`] with an [`EntityManager`].
    pub fn new(entity_manager: EntityManager, writer: Writer) -> Self {
        Self {
            entity_manager,
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    fn write_line(&self, line: String) {
        // A failed write of a log line must not abort the simulation.
        let _ = self.writer.lock().unwrap().write_all(line.as_bytes());
    }
}

/// Implementation for each [`Track`] event
impl Track for TextTracker {
    fn unique_tag(&self) -> Tag {
        self.entity_manager.unique_tag()
    }

    fn is_entity_enabled(&self, tag: Tag, level: log::Level) -> bool {
        self.entity_manager.is_enabled(tag, level)
    }

    fn add_entity(&self, tag: Tag, entity_name: &str) {
        self.entity_manager.add_entity(tag, entity_name);
    }

    fn enter(&self, tag: Tag, object: Tag) {
        self.write_line(format!("{tag}: enter {object}\n"));
    }

    fn exit(&self, tag: Tag, object: Tag) {
        self.write_line(format!("{tag}: exit {object}\n"));
    }

    fn create(&self, created_by: Tag, tag: Tag, name: &str) {
        self.write_line(format!("{created_by}: created {tag}, {name}\n"));
    }

    fn destroy(&self, destroyed_by: Tag, tag: Tag) {
        self.write_line(format!("{destroyed_by}: destroyed {tag}\n"));
    }

    fn log(&self, tag: Tag, level: log::Level, msg: std::fmt::Arguments) {
        let time = self.entity_manager.time();
        self.write_line(format!("{tag}:{level}@{time:.3}: {msg}\n"));
    }

    fn time(&self, _set_by: Tag, time: f64) {
        self.entity_manager.set_time(time);
    }

    fn shutdown(&self) {
        let _ = self.writer.lock().unwrap().flush();
    }
}
