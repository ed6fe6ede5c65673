//! Base Registry Module
//!
//! The ordered list of bases that make up the store.
//!
//! ## Responsibilities
//! - Hand out cheap snapshots (`Vec<Arc<Base>>`) to readers
//! - Rotate the current base when it fills up
//! - Swap compaction inputs for outputs in one step
//! - Keep the manifest in step with the in-memory list
//!
//! The last base in the list is always the current (writable) base. Every
//! change to the list is written to the manifest before it becomes visible
//! in memory, so a crash leaves either the old or the new list on disk.

mod manifest;

pub use manifest::{Manifest, ManifestData, ManifestEntry, MANIFEST_FILENAME};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::base::{Base, BaseId};
use crate::config::Config;
use crate::error::{BasaltError, Result};

/// Ordered set of live bases
///
/// ## Concurrency:
/// - `bases`: RwLock; readers clone a snapshot and release immediately,
///   rotation and compaction commit take it for writing
/// - `next_id`: atomic counter, ids are never reused
pub struct BaseRegistry {
    data_dir: PathBuf,
    manifest: Manifest,
    bases: RwLock<Vec<Arc<Base>>>,
    next_id: AtomicU64,
}

impl BaseRegistry {
    /// Wrap recovered bases. `bases` must end with the current base.
    pub fn new(data_dir: &Path, bases: Vec<Arc<Base>>, next_id: BaseId) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            manifest: Manifest::new(data_dir),
            bases: RwLock::new(bases),
            next_id: AtomicU64::new(next_id),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Reserve a fresh base id
    pub fn allocate_id(&self) -> BaseId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Clone of the current base list
    pub fn snapshot(&self) -> Vec<Arc<Base>> {
        self.bases.read().clone()
    }

    pub fn get(&self, id: BaseId) -> Option<Arc<Base>> {
        self.bases.read().iter().find(|b| b.id() == id).cloned()
    }

    /// The writable base
    pub fn current(&self) -> Result<Arc<Base>> {
        self.bases
            .read()
            .last()
            .cloned()
            .ok_or_else(|| BasaltError::Manifest("registry has no current base".to_string()))
    }

    pub fn base_ids(&self) -> Vec<BaseId> {
        self.bases.read().iter().map(|b| b.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.bases.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.read().is_empty()
    }

    /// Run `f` with the registry read lock held
    ///
    /// Used where the registry must not change between two steps, e.g. a
    /// lookup resolving an index slot to its base.
    pub fn with_read<T>(&self, f: impl FnOnce(&[Arc<Base>]) -> T) -> T {
        let bases = self.bases.read();
        f(&bases)
    }

    /// Register the very first base of a fresh store
    pub fn install_first(&self, base: Arc<Base>) -> Result<()> {
        let mut bases = self.bases.write();
        let mut next = bases.clone();
        next.push(base);
        self.save_manifest(&next)?;
        *bases = next;
        Ok(())
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Seal the current base and make a new empty one current
    ///
    /// `expected` is the id the caller saw as current. If another thread
    /// already rotated, nothing happens and the new current base is
    /// returned.
    pub fn rotate(&self, expected: BaseId, config: &Config) -> Result<Arc<Base>> {
        let mut bases = self.bases.write();

        if let Some(current) = bases.last() {
            if current.id() != expected {
                return Ok(Arc::clone(current));
            }
            current.seal()?;
        }

        let id = self.allocate_id();
        let base = Arc::new(Base::create(&self.data_dir, id, config)?);

        let mut next = bases.clone();
        next.push(Arc::clone(&base));
        if let Err(e) = self.save_manifest(&next) {
            if let Err(destroy_err) = base.destroy() {
                warn!(base_id = id, error = %destroy_err, "failed to remove unregistered base");
            }
            return Err(e);
        }
        *bases = next;

        info!(base_id = id, previous = expected, "rotated to new base");
        Ok(base)
    }

    // =========================================================================
    // Compaction Commit
    // =========================================================================

    /// Replace `inputs` with `outputs`, then run `then` before releasing the
    /// write lock
    ///
    /// Outputs take the position of the first input; the remaining inputs
    /// are dropped from the list. The manifest is written first: if that
    /// fails nothing changes. Returns the removed inputs and `then`'s value.
    pub fn replace<T>(
        &self,
        inputs: &[BaseId],
        outputs: &[Arc<Base>],
        then: impl FnOnce() -> T,
    ) -> Result<(Vec<Arc<Base>>, T)> {
        let mut bases = self.bases.write();

        let wanted: HashSet<BaseId> = inputs.iter().copied().collect();
        let position = bases
            .iter()
            .position(|b| wanted.contains(&b.id()))
            .ok_or_else(|| BasaltError::UnknownBase(inputs.first().copied().unwrap_or_default()))?;

        let mut next = Vec::with_capacity(bases.len() + outputs.len());
        let mut removed = Vec::with_capacity(inputs.len());
        for (pos, base) in bases.iter().enumerate() {
            if pos == position {
                next.extend(outputs.iter().cloned());
            }
            if wanted.contains(&base.id()) {
                removed.push(Arc::clone(base));
            } else {
                next.push(Arc::clone(base));
            }
        }

        if removed.len() != wanted.len() {
            let missing = wanted
                .iter()
                .find(|id| !removed.iter().any(|b| b.id() == **id))
                .copied()
                .unwrap_or_default();
            return Err(BasaltError::UnknownBase(missing));
        }

        self.save_manifest(&next)?;
        *bases = next;

        let value = then();
        Ok((removed, value))
    }

    fn save_manifest(&self, bases: &[Arc<Base>]) -> Result<()> {
        let data = ManifestData {
            next_id: self.next_id.load(Ordering::SeqCst),
            bases: bases
                .iter()
                .map(|b| ManifestEntry {
                    id: b.id(),
                    kind: b.kind(),
                })
                .collect(),
        };
        self.manifest.save(&data)
    }
}
