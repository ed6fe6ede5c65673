//! Iterator Module
//!
//! Single-pass scans over the records of every base.
//!
//! A scan is taken against a registry snapshot: the bases it visits stay
//! alive (and on disk) until the scan is dropped, even if a compaction
//! retires them meanwhile. The current base is bounded to the records it
//! held when the scan started, so concurrent appends are not observed.
//!
//! Order: registry order across bases; within a base, file order. That is
//! write order for unsorted bases and key order for sorted and view bases.

use std::collections::VecDeque;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use bytes::Bytes;

use crate::base::{Base, BaseEntry, BaseId};
use crate::error::{BasaltError, Result};
use crate::key::{Key, KeyRange};
use crate::record::RecordFlags;

/// Which records a scan yields
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterateFlags(u8);

impl IterateFlags {
    /// Everything physically present, tombstones and superseded records
    /// included
    pub const ALL: IterateFlags = IterateFlags(0);

    /// Only records that are each key's latest write and hold data
    pub const LIVE_ONLY: IterateFlags = IterateFlags(1 << 0);

    pub const fn contains(self, other: IterateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for IterateFlags {
    fn default() -> Self {
        IterateFlags::LIVE_ONLY
    }
}

impl BitOr for IterateFlags {
    type Output = IterateFlags;

    fn bitor(self, rhs: IterateFlags) -> IterateFlags {
        IterateFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for IterateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(IterateFlags::LIVE_ONLY) {
            write!(f, "IterateFlags(LIVE_ONLY)")
        } else {
            write!(f, "IterateFlags(ALL)")
        }
    }
}

/// One record delivered by a scan
///
/// Holds a handle on its base, so the payload can be read later even if
/// the base has been retired by then.
#[derive(Clone)]
pub struct RecordRef {
    entry: BaseEntry,
    base: Arc<Base>,
}

impl RecordRef {
    pub fn key(&self) -> &Key {
        &self.entry.key
    }

    pub fn flags(&self) -> RecordFlags {
        self.entry.flags
    }

    pub fn write_seq(&self) -> u64 {
        self.entry.write_seq
    }

    pub fn data_size(&self) -> u64 {
        self.entry.data_size
    }

    /// Offset of the record header in the file holding the bytes
    pub fn offset(&self) -> u64 {
        self.entry.offset
    }

    pub fn data_offset(&self) -> u64 {
        self.entry.data_offset()
    }

    pub fn base_id(&self) -> BaseId {
        self.base.id()
    }

    pub fn is_tombstone(&self) -> bool {
        self.entry.is_tombstone()
    }

    /// Superseded when the scan reached this record's base
    pub fn is_removed(&self) -> bool {
        self.entry.removed
    }

    /// Read and verify the payload
    pub fn read_data(&self) -> Result<Bytes> {
        if self.entry.data_size == 0 {
            return Ok(Bytes::new());
        }
        self.base.read(self.entry.offset, self.entry.data_size)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordRef")
            .field("key", &self.entry.key)
            .field("base_id", &self.base.id())
            .field("offset", &self.entry.offset)
            .field("data_size", &self.entry.data_size)
            .field("write_seq", &self.entry.write_seq)
            .field("flags", &self.entry.flags)
            .finish()
    }
}

/// Single-pass scan over a snapshot of bases
pub struct RecordScan {
    range: KeyRange,
    flags: IterateFlags,
    /// Bases still to visit, each with its entry count at scan start
    pending: VecDeque<(Arc<Base>, usize)>,
    /// Base being visited and its remaining entries
    active: Option<(Arc<Base>, std::vec::IntoIter<BaseEntry>)>,
}

impl RecordScan {
    /// Scan `bases` in the given order
    pub fn new(bases: Vec<Arc<Base>>, range: KeyRange, flags: IterateFlags) -> Self {
        let pending = bases
            .into_iter()
            .map(|base| {
                let limit = base.record_count() as usize;
                (base, limit)
            })
            .collect();
        Self {
            range,
            flags,
            pending,
            active: None,
        }
    }

    /// Hand every record to `visitor`, returning how many were delivered
    ///
    /// The first visitor error stops the scan and comes back as
    /// `IterationAborted`, carrying the count delivered before it.
    pub fn visit<F>(self, mut visitor: F) -> Result<usize>
    where
        F: FnMut(&RecordRef) -> Result<()>,
    {
        let mut delivered = 0;
        for record in self {
            if let Err(e) = visitor(&record) {
                return Err(BasaltError::IterationAborted {
                    delivered,
                    source: Box::new(e),
                });
            }
            delivered += 1;
        }
        Ok(delivered)
    }
}

fn wanted(flags: IterateFlags, entry: &BaseEntry) -> bool {
    if entry.flags.is_uncommitted() {
        return false;
    }
    !flags.contains(IterateFlags::LIVE_ONLY) || entry.is_live()
}

impl Iterator for RecordScan {
    type Item = RecordRef;

    fn next(&mut self) -> Option<RecordRef> {
        let flags = self.flags;
        loop {
            if let Some((base, entries)) = self.active.as_mut() {
                for entry in entries.by_ref() {
                    if wanted(flags, &entry) {
                        return Some(RecordRef {
                            entry,
                            base: Arc::clone(base),
                        });
                    }
                }
            }

            let (base, limit) = self.pending.pop_front()?;
            let entries = base.entries_in(&self.range, limit);
            self.active = Some((base, entries.into_iter()));
        }
    }
}

impl fmt::Debug for RecordScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordScan")
            .field("range", &self.range)
            .field("flags", &self.flags)
            .field("pending_bases", &self.pending.len())
            .finish()
    }
}
