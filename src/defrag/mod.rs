//! Defrag Module
//!
//! Compaction of sealed bases: merging, sorting, deduplicating and
//! dropping tombstones, or re-exposing a clean sorted base through a view.
//!
//! ## Phases
//! ```text
//!   plan ──► build (no exclusive locks) ──► commit (registry + index) ──► retire
//!              │                               │
//!              └─ error: outputs removed,      └─ error: outputs removed,
//!                 DefragAborted                   DefragAborted
//! ```
//!
//! The build phase runs concurrently with readers and writers. A record
//! copied into an output is only published if its key still points at the
//! copied location when the commit runs; otherwise the output entry is
//! marked removed on the spot.

pub mod commit;
pub mod merge;
pub mod periodic;
pub mod plan;

pub use merge::{MergeIterator, MergeRun, Merged};
pub use periodic::PeriodicDefrag;
pub use plan::{CompactTarget, Plan};

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::base::{Base, BaseEntry, BaseId, BuiltBase, RawRecord, SortedBaseBuilder};
use crate::config::Config;
use crate::error::{BasaltError, Result};
use crate::index::{IndexUpdate, Location, RamControl, RecordIndex};
use crate::registry::BaseRegistry;

/// Summary of one compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactReport {
    /// Bases replaced, in registry order
    pub inputs: Vec<BaseId>,
    /// Bases registered in their place
    pub outputs: Vec<BaseId>,
    /// Served by a view instead of copying
    pub used_view: bool,
    /// Records held by the inputs
    pub records_in: u64,
    /// Records in the outputs
    pub records_out: u64,
    /// Tombstones dropped together with their index slot
    pub tombstones_dropped: u64,
    /// Output records superseded while the compaction ran
    pub lost_races: u64,
    /// Bytes written to new sorted bases (zero for views)
    pub bytes_written: u64,
}

impl CompactReport {
    pub fn is_noop(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Everything a compaction needs from the engine
pub struct Compactor<'a> {
    pub registry: &'a BaseRegistry,
    pub index: &'a RecordIndex,
    pub config: &'a Config,
}

/// Outputs of the build phase, not yet published
struct Staged {
    outputs: Vec<Arc<Base>>,
    updates: Vec<IndexUpdate>,
}

impl Compactor<'_> {
    /// Run one compaction. The caller serializes compactions.
    pub fn run(&self, target: &CompactTarget) -> Result<CompactReport> {
        let started = Instant::now();
        let snapshot = self.registry.snapshot();
        let plan = plan::plan(target, &snapshot, self.config)?;

        let mut report = CompactReport {
            inputs: plan.input_ids(),
            ..CompactReport::default()
        };

        let staged = match &plan {
            Plan::Skip => return Ok(report),
            Plan::View(input) => {
                report.used_view = true;
                report.records_in = input.record_count();
                self.build_view(input)
            }
            Plan::Merge(inputs) => {
                report.records_in = inputs.iter().map(|b| b.record_count()).sum();
                self.build_merge(inputs, &snapshot, &mut report)
            }
        }
        .map_err(|e| abort("build", e))?;

        report.outputs = staged.outputs.iter().map(|b| b.id()).collect();
        report.records_out = staged.outputs.iter().map(|b| b.record_count()).sum();

        let outcome = match commit::commit(
            self.registry,
            self.index,
            &report.inputs,
            &staged.outputs,
            &staged.updates,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                commit::discard(staged.outputs);
                return Err(abort("commit", e));
            }
        };
        report.lost_races = outcome.lost_races as u64;
        report.tombstones_dropped = outcome.dropped_slots as u64;

        info!(
            inputs = ?report.inputs,
            outputs = ?report.outputs,
            view = report.used_view,
            records_in = report.records_in,
            records_out = report.records_out,
            tombstones_dropped = report.tombstones_dropped,
            lost_races = report.lost_races,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compaction committed"
        );
        Ok(report)
    }

    /// Replace one clean sorted base with a view over its surviving range
    fn build_view(&self, input: &Arc<Base>) -> Result<Staged> {
        let kept: Vec<BaseEntry> = input
            .entries()
            .into_iter()
            .filter(|e| !e.removed && self.index.points_at(&e.key, location(input.id(), e)))
            .collect();

        if kept.is_empty() {
            debug!(base_id = input.id(), "no survivors, base will be dropped");
            return Ok(Staged {
                outputs: Vec::new(),
                updates: Vec::new(),
            });
        }

        let id = self.registry.allocate_id();
        let view = Base::create_view(
            self.registry.data_dir(),
            id,
            Arc::clone(input),
            kept.clone(),
            self.config,
        )?;

        let updates = kept
            .iter()
            .map(|e| IndexUpdate::Repoint {
                key: e.key,
                expected: location(input.id(), e),
                new: RamControl::new(id, e),
            })
            .collect();

        Ok(Staged {
            outputs: vec![Arc::new(view)],
            updates,
        })
    }

    /// Merge the inputs into new sorted bases
    fn build_merge(
        &self,
        inputs: &[Arc<Base>],
        snapshot: &[Arc<Base>],
        report: &mut CompactReport,
    ) -> Result<Staged> {
        let input_ids: HashSet<BaseId> = inputs.iter().map(|b| b.id()).collect();
        let others: Vec<&Arc<Base>> = snapshot
            .iter()
            .filter(|b| !input_ids.contains(&b.id()))
            .collect();

        let runs = inputs.iter().map(|b| MergeRun::from_base(b)).collect();
        let mut outputs = OutputSet::new(self.registry, self.config);
        let mut updates = Vec::new();

        for merged in MergeIterator::new(runs) {
            let key = merged.entry.key;
            let expected = location(merged.base_id, &merged.entry);

            // Superseded by a write outside the inputs
            if !self.index.points_at(&key, expected) {
                continue;
            }

            // Nothing older is left anywhere else: the tombstone has done
            // its job
            if merged.entry.is_tombstone() && !others.iter().any(|b| b.contains_key(&key)) {
                updates.push(IndexUpdate::Drop { key, expected });
                continue;
            }

            let input = &inputs[merged.source];
            let copied = input
                .read_record(merged.entry.offset, merged.entry.data_size)
                .and_then(|record| outputs.add(&record));
            let (output_id, entry) = match copied {
                Ok(copied) => copied,
                Err(e) => {
                    outputs.abandon();
                    return Err(e);
                }
            };
            updates.push(IndexUpdate::Repoint {
                key,
                expected,
                new: RamControl::new(output_id, &entry),
            });
        }

        report.bytes_written = outputs.bytes_written();
        let outputs = outputs.finish()?;
        Ok(Staged { outputs, updates })
    }
}

fn location(base_id: BaseId, entry: &BaseEntry) -> Location {
    Location {
        base_id,
        offset: entry.offset,
    }
}

fn abort(phase: &str, e: BasaltError) -> BasaltError {
    warn!(phase, error = %e, "compaction aborted");
    BasaltError::DefragAborted(Box::new(e))
}

// =============================================================================
// Output Set
// =============================================================================

/// Sorted output bases of one merge, split on the base limits
struct OutputSet<'a> {
    registry: &'a BaseRegistry,
    config: &'a Config,
    open: Option<SortedBaseBuilder>,
    finished: Vec<BuiltBase>,
    bytes_written: u64,
}

impl<'a> OutputSet<'a> {
    fn new(registry: &'a BaseRegistry, config: &'a Config) -> Self {
        Self {
            registry,
            config,
            open: None,
            finished: Vec::new(),
            bytes_written: 0,
        }
    }

    fn add(&mut self, record: &RawRecord) -> Result<(BaseId, BaseEntry)> {
        let record_size = record.bytes.len() as u64;

        if let Some(builder) = self.open.take() {
            if builder.fits(record_size, self.config) {
                self.open = Some(builder);
            } else {
                self.bytes_written += builder.byte_size();
                self.finished.push(builder.finish()?);
            }
        }

        let builder = match self.open.as_mut() {
            Some(builder) => builder,
            None => {
                let id = self.registry.allocate_id();
                let builder = SortedBaseBuilder::create(self.registry.data_dir(), id, self.config)?;
                self.open.insert(builder)
            }
        };

        let entry = builder.add(record)?;
        Ok((builder.id(), entry))
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written + self.open.as_ref().map_or(0, |b| b.byte_size())
    }

    /// Close the last builder and open every output
    fn finish(mut self) -> Result<Vec<Arc<Base>>> {
        if let Some(builder) = self.open.take() {
            match builder.finish() {
                Ok(built) => self.finished.push(built),
                Err(e) => {
                    self.abandon();
                    return Err(e);
                }
            }
        }

        let mut outputs = Vec::with_capacity(self.finished.len());
        let mut built = std::mem::take(&mut self.finished).into_iter();
        while let Some(next) = built.next() {
            let path = next.path.clone();
            match Base::from_built(next) {
                Ok(base) => outputs.push(Arc::new(base)),
                Err(e) => {
                    remove_quietly(&path);
                    for rest in built {
                        remove_quietly(&rest.path);
                    }
                    commit::discard(outputs);
                    return Err(e);
                }
            }
        }
        Ok(outputs)
    }

    /// Remove every output written so far
    fn abandon(&mut self) {
        if let Some(builder) = self.open.take() {
            builder.abandon();
        }
        for built in self.finished.drain(..) {
            remove_quietly(&built.path);
        }
    }
}

fn remove_quietly(path: &std::path::Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove compaction output");
    }
}
