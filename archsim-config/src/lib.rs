// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This crate provides the hierarchical configuration used by archsim
//! applications. Settings are accepted from (lowest to highest priority):
//!
//!  1. built-in defaults ([`SimConfig::default`]),
//!  2. a TOML configuration file (`archsim.toml` in the working directory),
//!  3. environment variables prefixed with `ARCHSIM_`,
//!  4. the command line.
//!
//! An additional TOML file can be merged afterwards with
//! [`SimConfig::parse_extra_conf_file`]; command-line values still win over
//! it. The combination is built with
//! [clap](https://docs.rs/clap/latest/clap/_derive/index.html) and
//! [Figment](https://docs.rs/figment/latest/figment/).
//!
//! # Example
//!
//! ```
//! use archsim_config::SimConfig;
//!
//! let config = SimConfig::parse_sources_from(["archsim", "--seed", "7"]).unwrap();
//! assert_eq!(config.seed, Some(7));
//! assert_eq!(config.log_level.as_deref(), Some("warn"));
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Name of the configuration file picked up from the working directory.
pub const DEFAULT_CONF_FILE: &str = "archsim.toml";

/// Prefix of the environment variables that set configuration values.
pub const ENV_PREFIX: &str = "ARCHSIM_";

/// Configuration of an archsim simulation run.
///
/// Every field is an `Option` so that each source only overrides the values
/// it actually sets.
#[derive(Parser, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[command(about = "Architecture-level performance simulation of a three-tier system")]
pub struct SimConfig {
    /// Seed for every random number generator in the simulation
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Configure the default logging level (error, warn, info, debug, trace)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Regular expression selecting entities that log at `filter_level`
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,

    /// Logging level of the entities matched by `log_filter`
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_level: Option<String>,

    /// Specify a log file to write text log/trace to.
    ///
    /// Use '-' to write to stdout.
    #[arg(short = 'l', long = "log-file")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,

    /// Simulated time at which the simulation stops
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,

    /// Number of users in the closed workload
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_users: Option<usize>,

    /// Time each user waits between two requests
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think_time: Option<f64>,

    /// Failure probability of the network link between the tiers
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_failure_probability: Option<f64>,

    /// Path to additional configuration file
    ///
    /// This additional configuration file must contain TOML, and set values for
    /// fields of this struct.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_file: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: Some(1),
            log_level: Some("warn".to_string()),
            log_filter: Some(String::new()),
            filter_level: Some("trace".to_string()),
            log_file: Some("-".to_string()),
            end_time: Some(1000.0),
            num_users: Some(10),
            think_time: Some(5.0),
            link_failure_probability: Some(0.0),
            conf_file: Some(PathBuf::new()),
        }
    }
}

impl SimConfig {
    /// Build the configuration from all sources using the process arguments.
    pub fn parse_all_sources() -> Result<Self, figment::Error> {
        Self::parse_sources_from(std::env::args_os())
    }

    /// Build the configuration from all sources with explicit command-line
    /// arguments (the first item is the program name).
    pub fn parse_sources_from<I, T>(args: I) -> Result<Self, figment::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::figment_to_config(None)?;
        let cli = Self::parse_from(args);
        Ok(Self::clap_merge(config, cli))
    }

    /// Merge an additional TOML configuration file into `self`.
    ///
    /// Values in the extra file override the default file and the
    /// environment, but any value given explicitly in `cli` still wins.
    /// An empty path is ignored.
    pub fn parse_extra_conf_file(
        &mut self,
        conf_file: &Path,
        cli: &SimConfig,
    ) -> Result<(), std::io::Error> {
        if conf_file.as_os_str().is_empty() {
            return Ok(());
        }

        if conf_file.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::IsADirectory,
                format!("{} is not a file path", conf_file.display()),
            ));
        }

        if !conf_file.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", conf_file.display()),
            ));
        }

        let config = Self::figment_to_config(Some(conf_file))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        self.clap_merge_existing(config, cli);
        Ok(())
    }

    /// Command-line values only (nothing merged).
    pub fn cli_only_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::parse_from(args)
    }

    fn figment_to_config(extra_conf_file: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment =
            Figment::new().merge(Serialized::defaults(SimConfig::default()));
        figment = figment.merge(Toml::file(DEFAULT_CONF_FILE));
        if let Some(conf_file) = extra_conf_file {
            figment = figment.merge(Toml::file(conf_file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));
        figment.extract()
    }

    fn clap_merge(mut config: SimConfig, cli: SimConfig) -> SimConfig {
        macro_rules! merge_fields {
            ($($field:ident),* $(,)?) => {
                $(
                if cli.$field.is_some() {
                    config.$field = cli.$field;
                }
                )*
            };
        }
        merge_fields!(
            seed,
            log_level,
            log_filter,
            filter_level,
            log_file,
            end_time,
            num_users,
            think_time,
            link_failure_probability,
            conf_file,
        );
        config
    }

    fn clap_merge_existing(&mut self, config: SimConfig, cli: &SimConfig) {
        let defaults = SimConfig::default();
        macro_rules! merge_fields {
            ($($field:ident),* $(,)?) => {
                $(
                if cli.$field.is_some() {
                    self.$field = cli.$field.clone();
                } else if config.$field != defaults.$field {
                    self.$field = config.$field;
                }
                )*
            };
        }
        merge_fields!(
            seed,
            log_level,
            log_filter,
            filter_level,
            log_file,
            end_time,
            num_users,
            think_time,
            link_failure_probability,
            conf_file,
        );
    }
}
