//! Write path: insert and remove
//!
//! Every write is one record appended to the current base. Under the write
//! lock:
//! 1. Append (rotating to a new base when the current one is full)
//! 2. Point the key's index slot at the new record
//! 3. Mark the record it superseded as removed in that record's base

use tracing::trace;

use crate::error::{BasaltError, Result};
use crate::index::{IndexSlot, RamControl};
use crate::key::Key;
use crate::record::{DiskHeader, RecordFlags};

use super::{Engine, EngineInner};

impl Engine {
    /// Store `data` under `key`, replacing any previous value
    pub fn insert(&self, key: &Key, data: &[u8]) -> Result<()> {
        let mut next_seq = self.inner.write_lock.lock();

        let header = DiskHeader::new(*key, RecordFlags::NONE, data.len() as u64, *next_seq);
        let control = self.inner.append(&header, data)?;
        *next_seq += 1;

        self.inner.publish(*key, IndexSlot::Present(control));
        trace!(key = ?key, base_id = control.base_id, write_seq = control.write_seq, "inserted");
        Ok(())
    }

    /// Delete `key` by appending a tombstone
    ///
    /// Returns `KeyNotFound` (and writes nothing) if the key has no live
    /// value.
    pub fn remove(&self, key: &Key) -> Result<()> {
        let mut next_seq = self.inner.write_lock.lock();

        if !self.inner.index.lookup(key).is_some_and(|slot| slot.is_present()) {
            return Err(BasaltError::KeyNotFound);
        }

        let header = DiskHeader::tombstone(*key, *next_seq);
        let control = self.inner.append(&header, &[])?;
        *next_seq += 1;

        self.inner.publish(*key, IndexSlot::Tombstoned(control));
        trace!(key = ?key, base_id = control.base_id, write_seq = control.write_seq, "removed");
        Ok(())
    }
}

impl EngineInner {
    /// Append to the current base, rotating once if it is full.
    /// Called with the write lock held.
    fn append(&self, header: &DiskHeader, payload: &[u8]) -> Result<RamControl> {
        let mut base = self.registry.current()?;
        loop {
            match base.append(header, payload, &self.config) {
                Ok(entry) => return Ok(RamControl::new(base.id(), &entry)),
                Err(BasaltError::BaseFull { base_id }) => {
                    base = self.registry.rotate(base_id, &self.config)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Point `key` at its new record and stale-mark the old one
    fn publish(&self, key: Key, slot: IndexSlot) {
        let Some(previous) = self.index.upsert(key, slot) else {
            return;
        };
        let location = previous.location();
        if let Some(base) = self.registry.get(location.base_id) {
            base.mark_removed(location.offset);
        }
    }
}
