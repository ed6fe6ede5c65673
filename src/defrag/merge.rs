//! K-way merge over key-sorted runs
//!
//! Produces one winner per key in ascending key order. When a key appears
//! in several runs the entry with the highest write_seq wins; equal
//! sequences go to the run with the higher base id.
//!
//! Runs are built from in-memory base entries, so merging never touches
//! record bytes. Only survivors are read (and checksum verified) when they
//! are copied into an output base.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::base::{Base, BaseEntry, BaseId};
use crate::key::Key;

/// Entries of one input base, ascending by key, one entry per key
#[derive(Debug, Clone)]
pub struct MergeRun {
    pub base_id: BaseId,
    entries: Vec<BaseEntry>,
}

impl MergeRun {
    /// Build a run from arbitrary entries of one base
    ///
    /// Unsorted bases may hold the same key several times; only the entry
    /// with the highest write_seq is kept.
    pub fn new(base_id: BaseId, mut entries: Vec<BaseEntry>) -> Self {
        entries.retain(|e| !e.flags.is_uncommitted());
        entries.sort_by(|a, b| a.key.cmp(&b.key).then(b.write_seq.cmp(&a.write_seq)));
        entries.dedup_by_key(|e| e.key);
        Self { base_id, entries }
    }

    /// Run over every entry of `base`
    pub fn from_base(base: &Base) -> Self {
        let entries = base.entries();
        if base.is_sorted() {
            Self {
                base_id: base.id(),
                entries,
            }
        } else {
            Self::new(base.id(), entries)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BaseEntry] {
        &self.entries
    }
}

/// Winning entry for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merged {
    /// Position of the winning run in the merge input
    pub source: usize,
    pub base_id: BaseId,
    pub entry: BaseEntry,
    /// Entries for this key that lost
    pub shadowed: usize,
}

/// Next pending key of one run
struct HeapEntry {
    key: Key,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap; smallest key first, then lowest source
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges runs into a single key-ordered stream of winners
pub struct MergeIterator {
    runs: Vec<MergeRun>,
    /// Next unread position in each run
    cursors: Vec<usize>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    pub fn new(runs: Vec<MergeRun>) -> Self {
        let mut heap = BinaryHeap::with_capacity(runs.len());
        for (source, run) in runs.iter().enumerate() {
            if let Some(first) = run.entries.first() {
                heap.push(HeapEntry {
                    key: first.key,
                    source,
                });
            }
        }
        let cursors = vec![0; runs.len()];
        Self {
            runs,
            cursors,
            heap,
        }
    }

    /// Total entries across all runs
    pub fn input_len(&self) -> usize {
        self.runs.iter().map(MergeRun::len).sum()
    }

    /// Take the head of `source` and queue its next key
    fn advance(&mut self, source: usize) -> BaseEntry {
        let cursor = self.cursors[source];
        let entry = self.runs[source].entries[cursor];
        self.cursors[source] = cursor + 1;
        if let Some(next) = self.runs[source].entries.get(cursor + 1) {
            self.heap.push(HeapEntry {
                key: next.key,
                source,
            });
        }
        entry
    }

    fn beats(&self, challenger: (usize, &BaseEntry), best: (usize, &BaseEntry)) -> bool {
        let challenger_rank = (challenger.1.write_seq, self.runs[challenger.0].base_id);
        let best_rank = (best.1.write_seq, self.runs[best.0].base_id);
        challenger_rank > best_rank
    }
}

impl Iterator for MergeIterator {
    type Item = Merged;

    fn next(&mut self) -> Option<Merged> {
        let top = self.heap.pop()?;
        let mut best_source = top.source;
        let mut best = self.advance(top.source);
        let mut shadowed = 0;

        while self.heap.peek().is_some_and(|peek| peek.key == top.key) {
            let Some(dup) = self.heap.pop() else {
                break;
            };
            let candidate = self.advance(dup.source);
            if self.beats((dup.source, &candidate), (best_source, &best)) {
                best_source = dup.source;
                best = candidate;
            }
            shadowed += 1;
        }

        Some(Merged {
            source: best_source,
            base_id: self.runs[best_source].base_id,
            entry: best,
            shadowed,
        })
    }
}
