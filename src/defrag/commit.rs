//! Compaction commit
//!
//! The only step of a compaction that blocks readers and writers. Under the
//! registry write lock (then the index write lock, inside `apply`):
//!   1. write the manifest naming the outputs instead of the inputs
//!   2. swap outputs in at the position of the first input
//!   3. repoint or drop index slots that still point into the inputs
//!   4. mark outputs entries whose key was rewritten meanwhile as removed
//! Inputs are retired afterwards; their files go away with the last handle.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::base::{Base, BaseId};
use crate::error::Result;
use crate::index::{IndexUpdate, RecordIndex};
use crate::registry::BaseRegistry;

/// Result of a successful commit
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// Updates skipped because the key moved on during the compaction
    pub lost_races: usize,
    /// Index slots removed along with dropped tombstones
    pub dropped_slots: usize,
}

/// Publish `outputs` in place of `inputs`
///
/// On error nothing has changed: the registry, manifest and index still
/// describe the inputs, and the caller must discard the outputs.
pub fn commit(
    registry: &BaseRegistry,
    index: &RecordIndex,
    inputs: &[BaseId],
    outputs: &[Arc<Base>],
    updates: &[IndexUpdate],
) -> Result<CommitOutcome> {
    let (retired, outcome) = registry.replace(inputs, outputs, || {
        let lost = index.apply(updates);

        let mut outcome = CommitOutcome {
            lost_races: lost.len(),
            dropped_slots: 0,
        };
        let mut lost = lost.into_iter().peekable();
        for (pos, update) in updates.iter().enumerate() {
            let won = lost.next_if_eq(&pos).is_none();
            match update {
                IndexUpdate::Repoint { new, .. } if !won => {
                    if let Some(output) = outputs.iter().find(|b| b.id() == new.base_id) {
                        output.mark_removed(new.offset);
                    }
                }
                IndexUpdate::Drop { .. } if won => outcome.dropped_slots += 1,
                _ => {}
            }
        }
        outcome
    })?;

    for base in &retired {
        base.retire();
        debug!(base_id = base.id(), view_refs = base.view_refs(), "retired base");
    }
    Ok(outcome)
}

/// Remove outputs that will never be registered
pub fn discard(outputs: Vec<Arc<Base>>) {
    for output in outputs {
        if let Err(e) = output.destroy() {
            warn!(base_id = output.id(), error = %e, "failed to discard compaction output");
        }
    }
}
