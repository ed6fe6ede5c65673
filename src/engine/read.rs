//! Read path: lookup and scans
//!
//! Readers never take the write lock. A lookup resolves the key's index
//! slot to its base while holding the registry read lock, so a concurrent
//! compaction commit cannot swap the base out in between; the payload is
//! then read without any lock held.

use bytes::Bytes;

use crate::error::{BasaltError, Result};
use crate::index::IndexSlot;
use crate::iterator::{IterateFlags, RecordRef, RecordScan};
use crate::key::{Key, KeyRange};

use super::Engine;

impl Engine {
    /// Latest value of `key`
    ///
    /// `KeyNotFound` if the key was never written or its latest record is a
    /// tombstone.
    pub fn lookup(&self, key: &Key) -> Result<Bytes> {
        let resolved = self.inner.registry.with_read(|bases| {
            let control = match self.inner.index.lookup(key)? {
                IndexSlot::Present(control) => control,
                IndexSlot::Tombstoned(_) => return None,
            };
            let base = bases.iter().find(|b| b.id() == control.base_id).cloned();
            Some(base.ok_or(control.base_id).map(|base| (base, control)))
        });

        match resolved {
            None => Err(BasaltError::KeyNotFound),
            Some(Err(base_id)) => Err(BasaltError::UnknownBase(base_id)),
            Some(Ok((base, control))) => base.read(control.offset, control.data_size),
        }
    }

    /// Whether `key` currently has a live value
    pub fn contains(&self, key: &Key) -> bool {
        self.inner
            .index
            .lookup(key)
            .is_some_and(|slot| slot.is_present())
    }

    /// Single-pass scan over a snapshot of every base
    pub fn scan(&self, range: KeyRange, flags: IterateFlags) -> RecordScan {
        RecordScan::new(self.inner.registry.snapshot(), range, flags)
    }

    /// Hand every record in `range` to `visitor`
    ///
    /// Returns the number of records delivered. A visitor error stops the
    /// scan and is returned as `IterationAborted`.
    pub fn iterate<F>(&self, range: KeyRange, flags: IterateFlags, visitor: F) -> Result<usize>
    where
        F: FnMut(&RecordRef) -> Result<()>,
    {
        self.scan(range, flags).visit(visitor)
    }

    /// Number of bases a scan started now would visit
    pub fn base_count(&self) -> usize {
        self.inner.registry.with_read(|bases| bases.len())
    }
}
