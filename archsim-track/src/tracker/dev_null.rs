// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::tracker::Track;
use crate::{ROOT, Tag};

/// A tracker that does nothing.
///
/// This can be useful for benchmarks that want to have minimum overheads.
/// Tags are still unique so that objects keyed on them stay distinct.
pub struct DevNullTracker;

static DEV_NULL_TAG: AtomicU64 = AtomicU64::new(ROOT.0 + 1);

impl Track for DevNullTracker {
    fn unique_tag(&self) -> Tag {
        Tag(DEV_NULL_TAG.fetch_add(1, Ordering::Relaxed))
    }

    fn is_entity_enabled(&self, _tag: Tag, _level: log::Level) -> bool {
        false
    }
    fn add_entity(&self, _tag: Tag, _entity_name: &str) {}
    fn enter(&self, _tag: Tag, _obj: Tag) {}
    fn exit(&self, _tag: Tag, _obj: Tag) {}
    fn create(&self, _tag: Tag, _obj: Tag, _name: &str) {}
    fn destroy(&self, _tag: Tag, _obj: Tag) {}
    fn log(&self, _tag: Tag, _level: log::Level, _msg: std::fmt::Arguments) {}
    fn time(&self, _set_by: Tag, _time: f64) {}
    fn shutdown(&self) {}
}
