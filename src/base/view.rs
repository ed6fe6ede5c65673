//! Views
//!
//! A view is a read-only borrow of a byte range inside another base's file.
//! Defrag uses views to turn a clean sorted base into its own replacement
//! without copying a single payload byte. The owner counts its outstanding
//! views and refuses `destroy()` while any exist; a retired owner's file is
//! unlinked only after the last view (and every other handle) is gone.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::{BasaltError, Result};

use super::{Base, BaseId, Storage};

/// Reference-counted borrow of `[start, end)` in the owner's file
pub struct View {
    owner: Arc<Base>,
    start: u64,
    end: u64,
}

impl View {
    /// Borrow `[start, end)` of `owner`. A view over a view is resolved to
    /// the base that actually owns the bytes.
    pub fn new(owner: Arc<Base>, start: u64, end: u64) -> Result<Self> {
        let root = match &owner.storage {
            Storage::View(inner) => Arc::clone(&inner.owner),
            Storage::File(_) => owner,
        };

        if start > end || end > root.byte_size() {
            return Err(BasaltError::CorruptRecord(format!(
                "view range [{}, {}) outside base {} ({} bytes)",
                start,
                end,
                root.id(),
                root.byte_size()
            )));
        }

        root.view_refs.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            owner: root,
            start,
            end,
        })
    }

    pub fn owner(&self) -> &Arc<Base> {
        &self.owner
    }

    pub fn owner_id(&self) -> BaseId {
        self.owner.id()
    }

    pub fn range(&self) -> (u64, u64) {
        (self.start, self.end)
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Read bytes at an absolute owner offset; the read must stay inside
    /// the borrowed range
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let read_end = offset + buf.len() as u64;
        if offset < self.start || read_end > self.end {
            return Err(BasaltError::CorruptRecord(format!(
                "read [{}, {}) outside view [{}, {}) of base {}",
                offset,
                read_end,
                self.start,
                self.end,
                self.owner.id()
            )));
        }
        self.owner.storage.read_at(buf, offset)
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.owner.view_refs.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("owner", &self.owner.id())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}
