// Copyright (c) 2025 Graphcore Ltd. All rights reserved.
//
//! Build the tracker requested by the configuration.

use std::fs;
use std::io::{self, BufWriter};
use std::str::FromStr;
use std::sync::Arc;

use archsim_config::SimConfig;
use archsim_engine::types::SimError;
use archsim_track::tracker::{EntityManager, TextTracker};
use archsim_track::{Tracker, Writer};

/// Log file name that selects `stdout`.
pub const STDOUT_LOG_FILE: &str = "-";

fn parse_level(level: &str) -> Result<log::Level, SimError> {
    log::Level::from_str(level)
        .map_err(|_| SimError(format!("Unable to parse log level '{level}'")))
}

/// Create a text tracker writing to `writer`.
///
/// Entities matching `filter_regex` log at `filter_level`, all others at
/// `level`. An empty regex adds no filter.
pub fn build_text_tracker(
    level: log::Level,
    filter_regex: &str,
    filter_level: log::Level,
    writer: Writer,
) -> Result<Tracker, SimError> {
    let mut entity_manager = EntityManager::new(level);
    if !filter_regex.is_empty() {
        entity_manager
            .add_log_filter(filter_regex, filter_level)
            .map_err(|e| SimError(format!("Invalid log filter '{filter_regex}': {e}")))?;
    }
    Ok(Arc::new(TextTracker::new(entity_manager, writer)))
}

/// Set up the tracker according to the logging fields of `config`.
pub fn setup_tracker(config: &SimConfig) -> Result<Tracker, SimError> {
    let defaults = SimConfig::default();
    let field = |value: &Option<String>, default: &Option<String>| {
        value
            .clone()
            .or_else(|| default.clone())
            .unwrap_or_default()
    };

    let level = parse_level(&field(&config.log_level, &defaults.log_level))?;
    let filter_level = parse_level(&field(&config.filter_level, &defaults.filter_level))?;
    let filter_regex = field(&config.log_filter, &defaults.log_filter);
    let log_file = field(&config.log_file, &defaults.log_file);

    let writer: Writer = if log_file == STDOUT_LOG_FILE || log_file.is_empty() {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = fs::File::create(&log_file)
            .map_err(|e| SimError(format!("Unable to create log file '{log_file}': {e}")))?;
        Box::new(BufWriter::new(file))
    };
    build_text_tracker(level, &filter_regex, filter_level, writer)
}

#[cfg(test)]
mod tests {
    use archsim_track::entity::toplevel;
    use archsim_track::{Track, debug, info};

    use super::*;

    #[test]
    fn invalid_level_is_an_error() {
        let config = SimConfig {
            log_level: Some("loud".to_string()),
            ..SimConfig::default()
        };
        let err = setup_tracker(&config).err().unwrap();
        assert!(err.to_string().contains("'loud'"));
    }

    #[test]
    fn invalid_filter_is_an_error() {
        let config = SimConfig {
            log_filter: Some("(".to_string()),
            ..SimConfig::default()
        };
        assert!(setup_tracker(&config).is_err());
    }

    #[test]
    fn log_file_receives_filtered_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archsim.log");
        let config = SimConfig {
            log_level: Some("info".to_string()),
            log_filter: Some(".*disk".to_string()),
            filter_level: Some("debug".to_string()),
            log_file: Some(path.to_string_lossy().into_owned()),
            ..SimConfig::default()
        };

        let tracker = setup_tracker(&config).unwrap();
        let top = toplevel(&tracker, "top");
        let disk = Arc::new(archsim_track::entity::Entity::new(&top, "disk"));
        let cpu = Arc::new(archsim_track::entity::Entity::new(&top, "cpu"));
        info!(top ; "starting");
        debug!(disk ; "disk detail");
        debug!(cpu ; "cpu detail");
        tracker.shutdown();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("starting"));
        assert!(contents.contains("disk detail"));
        assert!(!contents.contains("cpu detail"));
    }

    #[test]
    fn unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("archsim.log");
        let config = SimConfig {
            log_file: Some(path.to_string_lossy().into_owned()),
            ..SimConfig::default()
        };
        let err = setup_tracker(&config).err().unwrap();
        assert!(err.to_string().contains("Unable to create log file"));
    }
}
