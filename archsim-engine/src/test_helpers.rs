// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use archsim_track::tracker::{EntityManager, TextTracker};
use archsim_track::{Tracker, Writer};

use crate::engine::Engine;

/// Create a tracker that writes all text log/trace output of a test to
/// `traces/<test file name>.log`.
#[must_use]
pub fn create_tracker(full_filepath: &str) -> Tracker {
    // Place all trace files in one folder
    const FOLDER: &str = "traces";

    // Create that folder if it doesn't exist yet
    fs::create_dir_all(FOLDER).unwrap();

    let filename_only = Path::new(full_filepath)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap();

    let writer: Writer = Box::new(BufWriter::new(
        fs::File::create(format!("{FOLDER}/{filename_only}.log")).unwrap(),
    ));

    let default_log_level = log::Level::Trace;
    let entity_manager = EntityManager::new(default_log_level);
    let tracker: Tracker = Arc::new(TextTracker::new(entity_manager, writer));
    tracker
}

#[must_use]
pub fn start_test<E>(full_filepath: &str) -> Engine<E> {
    Engine::new(&create_tracker(full_filepath))
}
