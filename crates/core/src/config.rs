// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Cache and sync configuration.
//!
//! Configuration is stored in `review-cache.toml`:
//!
//! ```toml
//! [cache]
//! dir = ".review-cache"
//! staleness_threshold_minutes = 5
//!
//! [remote]
//! owner = "acme"
//! repo = "roadmap"
//!
//! [sync]
//! lock_ttl_hours = 8
//! settle_delay_ms = 1000
//! ```
//!
//! Only `[cache].dir` is required; everything else has a default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::atomic::write_atomic;
use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "review-cache.toml";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    /// Remote tracker coordinates, recorded in the index for reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Where the cache lives and how long entries stay fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root (relative paths resolve against the config file's directory).
    pub dir: PathBuf,
    /// Minutes after which a cached document is reported stale (default: 5).
    #[serde(default = "default_staleness_threshold_minutes")]
    pub staleness_threshold_minutes: u32,
}

/// Remote repository the cache mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub owner: String,
    pub repo: String,
}

/// Timing knobs for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Lifetime of a lock taken on assignment (default: 8).
    #[serde(default = "default_lock_ttl_hours")]
    pub lock_ttl_hours: u32,
    /// Pause before re-reading a remote issue after writing it (default: 1000).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            lock_ttl_hours: default_lock_ttl_hours(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl SyncSettings {
    pub fn lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lock_ttl_hours))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_staleness_threshold_minutes() -> u32 {
    5
}

fn default_lock_ttl_hours() -> u32 {
    8
}

fn default_settle_delay_ms() -> u64 {
    1_000
}

impl CacheConfig {
    /// Config for a cache rooted at `dir` with default staleness.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheConfig {
            dir: dir.into(),
            staleness_threshold_minutes: default_staleness_threshold_minutes(),
        }
    }

    pub fn with_staleness_threshold(mut self, minutes: u32) -> Self {
        self.staleness_threshold_minutes = minutes;
        self
    }
}

impl Config {
    /// Creates a config for a cache rooted at `dir` with all defaults.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Config {
            cache: CacheConfig::new(dir),
            remote: None,
            sync: SyncSettings::default(),
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// A relative `[cache].dir` is resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        if config.cache.dir.is_relative() {
            if let Some(base) = path.parent() {
                config.cache.dir = base.join(&config.cache.dir);
            }
        }
        Ok(config)
    }

    /// Atomically saves configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        write_atomic(path, content.as_bytes())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
