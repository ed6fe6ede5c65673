//! Compaction planning
//!
//! Turns a `CompactTarget` into the concrete inputs of one compaction and
//! decides whether it can be served by a view or needs a full merge.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::base::{Base, BaseId};
use crate::config::Config;
use crate::error::{BasaltError, Result};

/// What to compact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactTarget {
    /// These bases (the current base is skipped)
    Bases(Vec<BaseId>),
    /// Every sealed base over the reclaimable threshold
    All,
}

/// Chosen strategy for one compaction
#[derive(Debug)]
pub enum Plan {
    /// Nothing to compact
    Skip,
    /// Re-expose the surviving range of one clean sorted base
    View(Arc<Base>),
    /// Merge the inputs into new sorted bases
    Merge(Vec<Arc<Base>>),
}

impl Plan {
    pub fn input_ids(&self) -> Vec<BaseId> {
        match self {
            Plan::Skip => Vec::new(),
            Plan::View(base) => vec![base.id()],
            Plan::Merge(bases) => bases.iter().map(|b| b.id()).collect(),
        }
    }
}

/// Whether a sealed base has enough reclaimable records to be worth a
/// rewrite
pub fn needs_defrag(base: &Base, config: &Config) -> bool {
    let stats = base.stats();
    stats.reclaimable > 0
        && stats.reclaimable * 100 >= u64::from(config.defrag_trigger_percentage) * stats.records
}

/// Plan a compaction over a registry snapshot
///
/// `snapshot` is in registry order and ends with the current base, which
/// is never an input.
pub fn plan(target: &CompactTarget, snapshot: &[Arc<Base>], config: &Config) -> Result<Plan> {
    let current_id = snapshot.last().map(|b| b.id());
    let sealed = &snapshot[..snapshot.len().saturating_sub(1)];

    let inputs: Vec<Arc<Base>> = match target {
        CompactTarget::Bases(ids) => {
            let wanted: HashSet<BaseId> = ids.iter().copied().collect();
            for id in &wanted {
                if !snapshot.iter().any(|b| b.id() == *id) {
                    return Err(BasaltError::UnknownBase(*id));
                }
            }
            if let Some(current) = current_id.filter(|id| wanted.contains(id)) {
                debug!(base_id = current, "skipping current base");
            }
            sealed
                .iter()
                .filter(|b| wanted.contains(&b.id()))
                .cloned()
                .collect()
        }
        CompactTarget::All => sealed
            .iter()
            .filter(|b| needs_defrag(b, config))
            .cloned()
            .collect(),
    };

    let plan = match inputs.as_slice() {
        [] => Plan::Skip,
        [only] if config.enable_views && only.is_clean_sorted() => Plan::View(Arc::clone(only)),
        _ => Plan::Merge(inputs),
    };
    debug!(?target, inputs = ?plan.input_ids(), "compaction planned");
    Ok(plan)
}
