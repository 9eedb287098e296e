//! Configuration for atomstore
//!
//! Centralized configuration with sensible defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{AtomError, Result};

/// Main configuration for a Universe instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the data file
    /// Internal structure:
    ///   {data_dir}/
    ///     └── universe.db      (append-only commit log)
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync the data file
    pub sync_strategy: LogSyncStrategy,

    /// Byte particles longer than this stay in the data file and are read lazily
    pub hosted_threshold: usize,

    /// Properties written into the header of a freshly created data file
    pub custom_properties: BTreeMap<String, String>,

    // -------------------------------------------------------------------------
    // Arena Configuration
    // -------------------------------------------------------------------------
    /// Arena segment size is `1 << arena_segment_bits` bytes
    pub arena_segment_bits: u32,

    /// Total arena capacity in bytes
    pub arena_capacity: u64,

    /// Run the memory optimizer on committed atoms
    pub optimizer_enabled: bool,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Publication batches larger than this use bulk (sort-once) mode
    pub bulk_threshold: usize,

    /// Point inserts buffered before merging into the sorted array
    pub small_tree_limit: usize,
}

/// Data file sync strategy
#[derive(Debug, Clone, Copy)]
pub enum LogSyncStrategy {
    /// fsync after every commit (safest, slowest)
    EveryCommit,

    /// fsync after N commits (balanced durability/performance)
    EveryNCommits { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atomstore_data"),
            sync_strategy: LogSyncStrategy::EveryNCommits { count: 64 },
            hosted_threshold: 32,
            custom_properties: BTreeMap::new(),
            arena_segment_bits: 15,
            arena_capacity: 1 << 30, // 1 GB
            optimizer_enabled: true,
            bulk_threshold: 2000,
            small_tree_limit: 1000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(4..=24).contains(&self.arena_segment_bits) {
            return Err(AtomError::Config(
                "arena_segment_bits must be in [4, 24]".into(),
            ));
        }
        if self.arena_capacity == 0 || self.arena_capacity > u32::MAX as u64 + 1 {
            return Err(AtomError::Config(
                "arena_capacity must be in [1, 4GB]".into(),
            ));
        }
        if self.hosted_threshold < 8 {
            return Err(AtomError::Config("hosted_threshold must be >= 8".into()));
        }
        if self.small_tree_limit == 0 {
            return Err(AtomError::Config("small_tree_limit must be > 0".into()));
        }
        if let LogSyncStrategy::EveryNCommits { count: 0 } = self.sync_strategy {
            return Err(AtomError::Config("sync count must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the data file sync strategy
    pub fn sync_strategy(mut self, strategy: LogSyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the inline size limit for byte particles
    pub fn hosted_threshold(mut self, bytes: usize) -> Self {
        self.config.hosted_threshold = bytes;
        self
    }

    /// Add a header property for a freshly created data file
    pub fn custom_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.custom_properties.insert(key.into(), value.into());
        self
    }

    /// Set the arena segment size as a power of two
    pub fn arena_segment_bits(mut self, bits: u32) -> Self {
        self.config.arena_segment_bits = bits;
        self
    }

    /// Set the total arena capacity (in bytes)
    pub fn arena_capacity(mut self, bytes: u64) -> Self {
        self.config.arena_capacity = bytes;
        self
    }

    /// Enable or disable the memory optimizer
    pub fn optimizer_enabled(mut self, enabled: bool) -> Self {
        self.config.optimizer_enabled = enabled;
        self
    }

    /// Set the batch size above which index publication runs in bulk mode
    pub fn bulk_threshold(mut self, count: usize) -> Self {
        self.config.bulk_threshold = count;
        self
    }

    /// Set the point-insert buffer size of index sorted sets
    pub fn small_tree_limit(mut self, count: usize) -> Self {
        self.config.small_tree_limit = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
