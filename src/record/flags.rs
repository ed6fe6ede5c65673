//! Record flag bitset

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Flags stored in every record header
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RecordFlags(u64);

impl RecordFlags {
    pub const NONE: RecordFlags = RecordFlags(0);

    /// Tombstone: the key is logically deleted as of this record
    pub const REMOVE: RecordFlags = RecordFlags(1 << 0);

    /// Regular value written by the append path
    pub const APPEND: RecordFlags = RecordFlags(1 << 1);

    /// Write that never completed; never made visible
    pub const UNCOMMITTED: RecordFlags = RecordFlags(1 << 2);

    pub const fn from_bits(bits: u64) -> Self {
        RecordFlags(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_removed(self) -> bool {
        self.contains(Self::REMOVE)
    }

    pub fn is_uncommitted(self) -> bool {
        self.contains(Self::UNCOMMITTED)
    }
}

impl BitOr for RecordFlags {
    type Output = RecordFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        RecordFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RecordFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for RecordFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::REMOVE) {
            names.push("REMOVE");
        }
        if self.contains(Self::APPEND) {
            names.push("APPEND");
        }
        if self.contains(Self::UNCOMMITTED) {
            names.push("UNCOMMITTED");
        }
        write!(f, "RecordFlags({})", names.join("|"))
    }
}
