//! Record index implementation
//!
//! HashMap-based index with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::key::Key;

use super::{IndexSlot, IndexUpdate, Location, RamControl};

/// Key → latest record location
pub struct RecordIndex {
    slots: RwLock<HashMap<Key, IndexSlot>>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Current slot of `key` (read lock)
    pub fn lookup(&self, key: &Key) -> Option<IndexSlot> {
        self.slots.read().get(key).copied()
    }

    /// Set the slot of `key`, returning the one it replaced (write lock)
    pub fn upsert(&self, key: Key, slot: IndexSlot) -> Option<IndexSlot> {
        self.slots.write().insert(key, slot)
    }

    /// Whether `key` currently points at `location`
    pub fn points_at(&self, key: &Key, location: Location) -> bool {
        self.slots
            .read()
            .get(key)
            .is_some_and(|slot| slot.location() == location)
    }

    /// Recovery: keep `control` if it is newer than what `key` holds.
    /// Newer means a higher write_seq; equal sequences go to the higher
    /// base id. Returns whichever record lost, if any.
    pub fn offer(&self, key: Key, control: RamControl) -> Option<RamControl> {
        let mut slots = self.slots.write();
        match slots.get(&key) {
            Some(existing) => {
                let current = *existing.control();
                let newer = (control.write_seq, control.base_id) > (current.write_seq, current.base_id);
                if newer {
                    slots.insert(key, IndexSlot::for_control(control));
                    Some(current)
                } else {
                    Some(control)
                }
            }
            None => {
                slots.insert(key, IndexSlot::for_control(control));
                None
            }
        }
    }

    /// Apply a defrag commit batch under one write lock
    ///
    /// Each update only takes effect if the key still points at its
    /// expected location. Returns the positions (in `updates`) of the
    /// updates that lost to a concurrent write.
    pub fn apply(&self, updates: &[IndexUpdate]) -> Vec<usize> {
        let mut slots = self.slots.write();
        let mut lost = Vec::new();

        for (pos, update) in updates.iter().enumerate() {
            let current = slots.get(update.key()).map(|slot| slot.location());
            if current != Some(update.expected()) {
                lost.push(pos);
                continue;
            }
            match update {
                IndexUpdate::Repoint { key, new, .. } => {
                    slots.insert(*key, IndexSlot::for_control(*new));
                }
                IndexUpdate::Drop { key, .. } => {
                    slots.remove(key);
                }
            }
        }

        lost
    }

    /// Number of keys with a slot (tombstoned ones included)
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Number of keys whose latest record holds data
    pub fn live_len(&self) -> usize {
        self.slots.read().values().filter(|s| s.is_present()).count()
    }
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self::new()
    }
}
