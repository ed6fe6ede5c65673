//! Record Index Module
//!
//! Maps every key to the location of its most recent record.
//!
//! ## Responsibilities
//! - Point lookups without touching disk
//! - Synchronous updates on every insert and remove
//! - Compare-and-swap repointing when defrag commits
//!
//! ## Data Structure Choice
//! A HashMap wrapped in a parking_lot RwLock. Ordered access is never
//! needed here: range scans walk the bases themselves, which are either
//! already key-sorted or small enough to filter.

mod table;

pub use table::RecordIndex;

use crate::base::{BaseEntry, BaseId};
use crate::key::Key;
use crate::record::RecordFlags;

/// Where a record lives: base and header offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub base_id: BaseId,
    pub offset: u64,
}

/// Cached location and header fields of a key's latest record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamControl {
    pub base_id: BaseId,
    /// Offset of the record header
    pub offset: u64,
    /// Offset of the first payload byte
    pub data_offset: u64,
    pub data_size: u64,
    pub write_seq: u64,
    pub flags: RecordFlags,
}

impl RamControl {
    pub fn new(base_id: BaseId, entry: &BaseEntry) -> Self {
        Self {
            base_id,
            offset: entry.offset,
            data_offset: entry.data_offset(),
            data_size: entry.data_size,
            write_seq: entry.write_seq,
            flags: entry.flags,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            base_id: self.base_id,
            offset: self.offset,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags.is_removed()
    }
}

/// The single index entry of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSlot {
    /// Latest record holds data
    Present(RamControl),
    /// Latest record is a tombstone
    Tombstoned(RamControl),
}

impl IndexSlot {
    /// Slot for a record, chosen by its REMOVE flag
    pub fn for_control(control: RamControl) -> Self {
        if control.is_tombstone() {
            IndexSlot::Tombstoned(control)
        } else {
            IndexSlot::Present(control)
        }
    }

    pub fn control(&self) -> &RamControl {
        match self {
            IndexSlot::Present(c) | IndexSlot::Tombstoned(c) => c,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, IndexSlot::Present(_))
    }

    pub fn location(&self) -> Location {
        self.control().location()
    }
}

/// One change of a defrag commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUpdate {
    /// Move the key to `new`, if it still points at `expected`
    Repoint {
        key: Key,
        expected: Location,
        new: RamControl,
    },
    /// Forget the key, if it still points at `expected`
    Drop { key: Key, expected: Location },
}

impl IndexUpdate {
    pub fn key(&self) -> &Key {
        match self {
            IndexUpdate::Repoint { key, .. } | IndexUpdate::Drop { key, .. } => key,
        }
    }

    pub fn expected(&self) -> Location {
        match self {
            IndexUpdate::Repoint { expected, .. } | IndexUpdate::Drop { expected, .. } => *expected,
        }
    }
}
