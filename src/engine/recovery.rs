//! Startup recovery
//!
//! Rebuilds the in-memory state from the data directory:
//! 1. Load the manifest (a missing manifest means a fresh store)
//! 2. Delete files the manifest does not reference
//! 3. Open every listed base; views pull in their owner, even when the
//!    owner itself has already been replaced
//! 4. Rebuild the record index, marking superseded entries removed
//! 5. Make sure the last base is writable, rotating if needed

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::base::{parse_base_id, Base, BaseId, BaseKind};
use crate::config::Config;
use crate::error::Result;
use crate::index::{RamControl, RecordIndex};
use crate::registry::{BaseRegistry, Manifest, ManifestData, MANIFEST_FILENAME};

/// State handed to the engine after recovery
pub(crate) struct Recovered {
    pub registry: BaseRegistry,
    pub index: RecordIndex,
    pub next_seq: u64,
}

pub(crate) fn recover(config: &Config) -> Result<Recovered> {
    let dir = config.data_dir.as_path();
    let data = Manifest::new(dir).load()?.unwrap_or_default();

    let mut referenced: HashSet<BaseId> = HashSet::new();
    for entry in &data.bases {
        referenced.insert(entry.id);
        if let BaseKind::View { owner } = entry.kind {
            referenced.insert(owner);
        }
    }
    remove_unreferenced(dir, &referenced)?;

    let bases = load_bases(dir, &data, config)?;
    let (index, next_seq) = rebuild_index(&bases);

    let next_id = referenced
        .iter()
        .map(|id| id + 1)
        .chain([data.next_id, 1])
        .max()
        .unwrap_or(1);
    let registry = BaseRegistry::new(dir, bases, next_id);
    ensure_writable(&registry, config)?;

    info!(
        bases = registry.len(),
        keys = index.len(),
        next_seq,
        "recovery complete"
    );
    Ok(Recovered {
        registry,
        index,
        next_seq,
    })
}

/// Leftovers of interrupted rotations and compactions
fn remove_unreferenced(dir: &Path, referenced: &HashSet<BaseId>) -> Result<()> {
    for dirent in fs::read_dir(dir)? {
        let path = dirent?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == MANIFEST_FILENAME {
            continue;
        }

        let stale = name.ends_with(".tmp")
            || parse_base_id(&path).is_some_and(|id| !referenced.contains(&id));
        if stale {
            warn!(path = %path.display(), "removing unreferenced file");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn load_bases(dir: &Path, data: &ManifestData, config: &Config) -> Result<Vec<Arc<Base>>> {
    let mut bases: Vec<Arc<Base>> = Vec::with_capacity(data.bases.len());
    // Owners that are no longer registered themselves
    let mut hidden: HashMap<BaseId, Arc<Base>> = HashMap::new();

    for (pos, entry) in data.bases.iter().enumerate() {
        let owner = match entry.kind {
            BaseKind::View { owner } => {
                let registered = bases.iter().find(|b| b.id() == owner).cloned();
                let owner_base = match registered {
                    Some(base) => base,
                    None => match hidden.get(&owner) {
                        Some(base) => Arc::clone(base),
                        None => {
                            let base =
                                Arc::new(Base::open(dir, owner, BaseKind::Sorted, None, config, false)?);
                            // Goes away with the last view over it
                            base.retire();
                            debug!(base_id = owner, "loaded retired view owner");
                            hidden.insert(owner, Arc::clone(&base));
                            base
                        }
                    },
                };
                Some(owner_base)
            }
            _ => None,
        };

        let is_last = pos + 1 == data.bases.len();
        let writable = is_last && entry.kind == BaseKind::Unsorted;
        let base = Base::open(dir, entry.id, entry.kind, owner, config, writable)?;
        debug!(
            base_id = entry.id,
            kind = ?entry.kind,
            records = base.record_count(),
            "loaded base"
        );
        bases.push(Arc::new(base));
    }

    Ok(bases)
}

/// Newest write per key wins; every loser is marked removed in its base
fn rebuild_index(bases: &[Arc<Base>]) -> (RecordIndex, u64) {
    let index = RecordIndex::new();
    let mut max_seq = 0;

    for base in bases {
        for entry in base.entries() {
            max_seq = max_seq.max(entry.write_seq);
            let control = RamControl::new(base.id(), &entry);
            if let Some(loser) = index.offer(entry.key, control) {
                if let Some(owner) = bases.iter().find(|b| b.id() == loser.base_id) {
                    owner.mark_removed(loser.offset);
                }
            }
        }
    }

    (index, max_seq + 1)
}

/// The last base must accept appends; rotate if it cannot
fn ensure_writable(registry: &BaseRegistry, config: &Config) -> Result<()> {
    let current = registry.snapshot().last().cloned();
    match current {
        Some(base) if base.is_writable() && !is_full(&base, config) => Ok(()),
        Some(base) => {
            registry.rotate(base.id(), config)?;
            Ok(())
        }
        None => {
            let id = registry.allocate_id();
            let base = Base::create(registry.data_dir(), id, config)?;
            registry.install_first(Arc::new(base))
        }
    }
}

fn is_full(base: &Base, config: &Config) -> bool {
    base.record_count() >= config.max_records_per_base || base.byte_size() >= config.max_blob_size
}
