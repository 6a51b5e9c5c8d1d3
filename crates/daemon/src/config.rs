// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration
//!
//! Settings come from an optional TOML file, then environment overrides.
//! Durations use humantime syntax (`30s`, `1m 30s`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use plot_engine::{EngineConfig, HeartbeatConfig, SchedulerConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::protocol::DEFAULT_TIMEOUT;

pub const ENV_LISTEN: &str = "PLOTD_LISTEN";
pub const ENV_STATE_DIR: &str = "PLOTD_STATE_DIR";
pub const ENV_AUTH_TOKEN: &str = "PLOTD_AUTH_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("could not determine state directory")]
    NoStateDir,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the connection manager listens on
    pub listen: SocketAddr,
    /// Where the lock, log and snapshot live
    pub state_dir: Option<PathBuf>,
    /// When set, clients must present this token in their hello
    pub auth_token: Option<String>,
    #[serde(with = "humantime_serde")]
    pub offline_threshold: Duration,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub scheduler_tick: Duration,
    pub max_running_jobs: usize,
    /// Outbound event queue per connection
    pub queue_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub snapshot_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8765)),
            state_dir: None,
            auth_token: None,
            offline_threshold: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            scheduler_tick: Duration::from_secs(5),
            max_running_jobs: 1,
            queue_capacity: plot_core::DEFAULT_QUEUE_CAPACITY,
            snapshot_interval: Duration::from_secs(30),
            handshake_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    /// Load from `path` (if any) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|var| std::env::var(var).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PLOTD_*` overrides read through `lookup`
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_LISTEN) {
            self.listen = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_LISTEN,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_STATE_DIR).filter(|v| !v.is_empty()) {
            self.state_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_AUTH_TOKEN) {
            self.auth_token = (!value.is_empty()).then_some(value);
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("offline_threshold", self.offline_threshold.is_zero()),
            ("sweep_interval", self.sweep_interval.is_zero()),
            ("scheduler_tick", self.scheduler_tick.is_zero()),
            ("max_running_jobs", self.max_running_jobs == 0),
            ("queue_capacity", self.queue_capacity == 0),
            ("snapshot_interval", self.snapshot_interval.is_zero()),
        ];
        match non_zero.into_iter().find(|(_, zero)| *zero) {
            Some((name, _)) => Err(ConfigError::Zero(name)),
            None => Ok(()),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            scheduler: SchedulerConfig {
                tick: self.scheduler_tick,
                max_running_jobs: self.max_running_jobs,
                offline_threshold: self.offline_threshold,
            },
            heartbeat: HeartbeatConfig {
                offline_threshold: self.offline_threshold,
                sweep_interval: self.sweep_interval,
            },
        }
    }

    /// Resolve the state directory: configured, then XDG, then `~/.local/state`
    pub fn resolve_state_dir(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        if let Some(xdg) = lookup("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(xdg).join("plotd"));
        }
        let home = lookup("HOME").ok_or(ConfigError::NoStateDir)?;
        Ok(PathBuf::from(home).join(".local/state/plotd"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
