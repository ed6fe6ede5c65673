//! Configuration for Basalt
//!
//! Centralized configuration with sensible defaults. The engine never loads
//! configuration itself; callers build a `Config` once and hand it over.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BasaltError, Result};

/// Main configuration for a Basalt instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── MANIFEST            (ordered list of live bases)
    ///     ├── data-000001.blob    (unsorted or sorted base)
    ///     └── data-000007.view    (view base: trailer only)
    pub data_dir: PathBuf,

    /// Maximum number of records in a single base before rotation
    pub max_records_per_base: u64,

    /// Maximum size of a single base file in bytes before rotation
    pub max_blob_size: u64,

    /// When to fsync the writable base
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Defrag Configuration
    // -------------------------------------------------------------------------
    /// A sealed base becomes a defrag candidate once this percentage of its
    /// records is reclaimable
    pub defrag_trigger_percentage: u8,

    /// Interval of the periodic defrag thread (zero disables it)
    pub defrag_timeout: Duration,

    /// Random extra delay added to each periodic defrag interval
    pub defrag_splay: Duration,

    /// Reuse byte ranges of clean sorted bases instead of copying them
    pub enable_views: bool,

    /// Build index blocks and bloom filters for sorted bases
    pub enable_sorted_index: bool,

    // -------------------------------------------------------------------------
    // Sorted Index Configuration
    // -------------------------------------------------------------------------
    /// Records per index block
    pub index_block_size: usize,

    /// Target false positive rate of each index block's bloom filter
    pub bloom_false_positive_rate: f64,
}

/// Sync strategy for the writable base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync only when a base is sealed and on close
    OnRotate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./basalt_data"),
            max_records_per_base: 50_000_000,
            max_blob_size: 50 * 1024 * 1024 * 1024, // 50 GiB
            sync_strategy: SyncStrategy::OnRotate,
            defrag_trigger_percentage: 25,
            defrag_timeout: Duration::from_secs(24 * 60 * 60),
            defrag_splay: Duration::from_secs(60 * 60),
            enable_views: true,
            enable_sorted_index: true,
            index_block_size: 40,
            bloom_false_positive_rate: 0.01,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_records_per_base == 0 {
            return Err(BasaltError::Config(
                "max_records_per_base must be > 0".to_string(),
            ));
        }
        if self.max_blob_size == 0 {
            return Err(BasaltError::Config("max_blob_size must be > 0".to_string()));
        }
        if self.defrag_trigger_percentage > 100 {
            return Err(BasaltError::Config(format!(
                "defrag_trigger_percentage must be <= 100, got {}",
                self.defrag_trigger_percentage
            )));
        }
        if self.index_block_size == 0 {
            return Err(BasaltError::Config("index_block_size must be > 0".to_string()));
        }
        if !(self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0) {
            return Err(BasaltError::Config(format!(
                "bloom_false_positive_rate must be in (0, 1), got {}",
                self.bloom_false_positive_rate
            )));
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
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the maximum record count per base
    pub fn max_records_per_base(mut self, count: u64) -> Self {
        self.config.max_records_per_base = count;
        self
    }

    /// Set the maximum base file size (in bytes)
    pub fn max_blob_size(mut self, size: u64) -> Self {
        self.config.max_blob_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the reclaimable percentage that makes a base a defrag candidate
    pub fn defrag_trigger_percentage(mut self, percentage: u8) -> Self {
        self.config.defrag_trigger_percentage = percentage;
        self
    }

    /// Set the periodic defrag interval (zero disables periodic defrag)
    pub fn defrag_timeout(mut self, timeout: Duration) -> Self {
        self.config.defrag_timeout = timeout;
        self
    }

    /// Set the maximum random splay added to the defrag interval
    pub fn defrag_splay(mut self, splay: Duration) -> Self {
        self.config.defrag_splay = splay;
        self
    }

    /// Enable or disable views over clean sorted bases
    pub fn enable_views(mut self, enabled: bool) -> Self {
        self.config.enable_views = enabled;
        self
    }

    /// Enable or disable index blocks for sorted bases
    pub fn enable_sorted_index(mut self, enabled: bool) -> Self {
        self.config.enable_sorted_index = enabled;
        self
    }

    /// Set the number of records per index block
    pub fn index_block_size(mut self, size: usize) -> Self {
        self.config.index_block_size = size;
        self
    }

    /// Set the bloom filter false positive rate
    pub fn bloom_false_positive_rate(mut self, rate: f64) -> Self {
        self.config.bloom_false_positive_rate = rate;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
