//! Engine Module
//!
//! The public facade that ties bases, the record index, the registry and
//! the defrag engine together.
//!
//! ## Responsibilities
//! - Recover state on open
//! - Serialize writers and assign write sequence numbers
//! - Serve lookups and scans concurrently with writes
//! - Run compactions on demand and periodically

mod read;
mod recovery;
mod write;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::base::{BaseId, BaseStats};
use crate::config::Config;
use crate::defrag::{CompactReport, CompactTarget, Compactor, PeriodicDefrag};
use crate::error::Result;
use crate::index::RecordIndex;
use crate::registry::BaseRegistry;

/// Engine-wide counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    /// Per-base counters, in registry order
    pub bases: Vec<BaseStats>,
    /// Keys with an index slot, tombstoned ones included
    pub keys: usize,
    /// Keys whose latest record holds data
    pub live_keys: usize,
    /// Sequence number the next write will get
    pub next_write_seq: u64,
}

/// State shared with the periodic defrag thread
pub(crate) struct EngineInner {
    config: Config,
    registry: BaseRegistry,
    index: RecordIndex,
    /// Serializes insert/remove; guards the next write sequence number
    write_lock: Mutex<u64>,
    /// One compaction at a time
    defrag_lock: Mutex<()>,
}

impl EngineInner {
    fn compact(&self, target: &CompactTarget) -> Result<CompactReport> {
        let _defrag_guard = self.defrag_lock.lock();
        Compactor {
            registry: &self.registry,
            index: &self.index,
            config: &self.config,
        }
        .run(target)
    }
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (insert/remove): serialized by `write_lock`
///   - append to the current base → index upsert → stale-mark the
///     superseded record in its base
/// - **Reads** (lookup/scan): never take `write_lock`
///   - registry read → index read, then positioned reads without locks
/// - **Defrag**: serialized by `defrag_lock`; builds outputs without
///   exclusive locks, commits under registry write → index write
///
/// Lock order everywhere: registry → index → per-base index.
pub struct Engine {
    inner: Arc<EngineInner>,
    periodic: Option<PeriodicDefrag>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Recover bases and rebuild the record index
    /// 3. Start periodic defrag (unless `defrag_timeout` is zero)
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let recovered = recovery::recover(&config)?;
        let inner = Arc::new(EngineInner {
            registry: recovered.registry,
            index: recovered.index,
            write_lock: Mutex::new(recovered.next_seq),
            defrag_lock: Mutex::new(()),
            config,
        });

        let periodic = if inner.config.defrag_timeout.is_zero() {
            None
        } else {
            let worker = Arc::clone(&inner);
            Some(PeriodicDefrag::spawn(
                inner.config.defrag_timeout,
                inner.config.defrag_splay,
                move || match worker.compact(&CompactTarget::All) {
                    Ok(report) if report.is_noop() => debug!("periodic defrag: nothing to do"),
                    Ok(report) => info!(
                        inputs = ?report.inputs,
                        outputs = ?report.outputs,
                        "periodic defrag finished"
                    ),
                    Err(e) => warn!(error = %e, "periodic defrag failed"),
                },
            )?)
        };

        info!(
            data_dir = %inner.config.data_dir.display(),
            bases = inner.registry.len(),
            "engine opened"
        );
        Ok(Self { inner, periodic })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Compact the given bases, or every base over the reclaimable
    /// threshold
    ///
    /// All-or-nothing: on `DefragAborted` the store is exactly as before.
    pub fn compact(&self, target: CompactTarget) -> Result<CompactReport> {
        self.inner.compact(&target)
    }

    /// Same as `compact(CompactTarget::All)`
    pub fn defrag(&self) -> Result<CompactReport> {
        self.inner.compact(&CompactTarget::All)
    }

    /// Close the engine gracefully
    ///
    /// Stops periodic defrag and syncs the current base
    pub fn close(mut self) -> Result<()> {
        if let Some(mut periodic) = self.periodic.take() {
            periodic.stop();
        }
        let _write_guard = self.inner.write_lock.lock();
        self.inner.registry.current()?.sync()?;
        info!("engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Ids of all live bases, in registry order; the last one is current
    pub fn base_ids(&self) -> Vec<BaseId> {
        self.inner.registry.base_ids()
    }

    pub fn stats(&self) -> EngineStats {
        let bases = self
            .inner
            .registry
            .snapshot()
            .iter()
            .map(|b| b.stats())
            .collect();
        EngineStats {
            bases,
            keys: self.inner.index.len(),
            live_keys: self.inner.index.live_len(),
            next_write_seq: *self.inner.write_lock.lock(),
        }
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(mut periodic) = self.periodic.take() {
            periodic.stop();
        }
    }
}
