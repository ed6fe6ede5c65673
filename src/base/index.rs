//! Per-base record index
//!
//! Every base keeps the headers of its records in memory, in file order.
//! For unsorted bases file order is write order; for sorted and view bases
//! it is key order, so entries are always ascending by offset and can be
//! located by binary search on the offset.
//!
//! Sorted bases additionally group entries into index blocks. Each block
//! covers a contiguous key range and carries a bloom filter, letting `find`
//! and range scans skip blocks without touching record bytes.

use serde::{Deserialize, Serialize};

use crate::bloom::BloomFilter;
use crate::config::Config;
use crate::key::{Key, KeyRange};
use crate::record::{DiskHeader, RecordFlags, HEADER_SIZE};

/// In-memory header of one record in a base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseEntry {
    pub key: Key,
    /// Offset of the record header in the (owner's) file
    pub offset: u64,
    pub data_size: u64,
    pub flags: RecordFlags,
    pub write_seq: u64,
    /// The record index no longer points here
    pub removed: bool,
    /// Already counted as reclaimable
    pub(crate) counted: bool,
}

impl BaseEntry {
    pub fn from_header(header: &DiskHeader, offset: u64) -> Self {
        Self {
            key: header.key,
            offset,
            data_size: header.data_size,
            flags: header.flags,
            write_seq: header.write_seq,
            removed: false,
            counted: false,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags.is_removed()
    }

    /// Live: not a tombstone and not superseded
    pub fn is_live(&self) -> bool {
        !self.removed && !self.is_tombstone()
    }

    pub fn data_offset(&self) -> u64 {
        self.offset + HEADER_SIZE
    }

    pub fn record_size(&self) -> u64 {
        HEADER_SIZE + self.data_size
    }

    pub fn header(&self) -> DiskHeader {
        DiskHeader::new(self.key, self.flags, self.data_size, self.write_seq)
    }
}

/// Key range summary of a run of sorted entries
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBlock {
    pub start_key: Key,
    pub end_key: Key,
    pub bloom: BloomFilter,
    /// Position of the first member in the entry list
    pub first: usize,
    pub len: usize,
}

impl IndexBlock {
    /// Build blocks of `config.index_block_size` entries over sorted entries
    pub fn build_all(entries: &[BaseEntry], config: &Config) -> Vec<IndexBlock> {
        entries
            .chunks(config.index_block_size)
            .enumerate()
            .map(|(i, chunk)| Self::build(chunk, i * config.index_block_size, config))
            .collect()
    }

    fn build(members: &[BaseEntry], first: usize, config: &Config) -> IndexBlock {
        let mut bloom = BloomFilter::new(members.len(), config.bloom_false_positive_rate);
        for entry in members {
            bloom.insert(entry.key.as_bytes());
        }
        IndexBlock {
            start_key: members[0].key,
            end_key: members[members.len() - 1].key,
            bloom,
            first,
            len: members.len(),
        }
    }

    pub fn members(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.len
    }
}

/// All in-memory metadata of a base
#[derive(Debug, Default)]
pub struct BaseIndex {
    pub(crate) entries: Vec<BaseEntry>,
    pub(crate) blocks: Vec<IndexBlock>,
    /// Entries marked removed
    pub(crate) removed: u64,
    /// Entries a defrag could drop
    pub(crate) reclaimable: u64,
    pub(crate) tombstones: u64,
    /// Entries are in key order
    pub(crate) sorted: bool,
}

impl BaseIndex {
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Index over key-ordered entries. Carried tombstones count as
    /// reclaimable, so `CompactTarget::All` revisits the base once the
    /// copies they hide are gone.
    pub fn sorted(mut entries: Vec<BaseEntry>, blocks: Vec<IndexBlock>) -> Self {
        let mut tombstones = 0;
        for entry in entries.iter_mut().filter(|e| e.is_tombstone()) {
            entry.counted = true;
            tombstones += 1;
        }
        Self {
            entries,
            blocks,
            removed: 0,
            reclaimable: tombstones,
            tombstones,
            sorted: true,
        }
    }

    /// Append an entry written by the write path
    pub fn push(&mut self, mut entry: BaseEntry) {
        if entry.is_tombstone() {
            self.tombstones += 1;
            // Write-path tombstones are dead weight from the start
            entry.counted = true;
            self.reclaimable += 1;
        }
        self.entries.push(entry);
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

    pub fn blocks(&self) -> &[IndexBlock] {
        &self.blocks
    }

    pub fn position_of(&self, offset: u64) -> Option<usize> {
        self.entries
            .binary_search_by_key(&offset, |e| e.offset)
            .ok()
    }

    /// Flag the entry at `offset` as superseded. Returns false if it was
    /// unknown or already removed.
    pub fn mark_removed(&mut self, offset: u64) -> bool {
        let Some(pos) = self.position_of(offset) else {
            return false;
        };
        let entry = &mut self.entries[pos];
        if entry.removed {
            return false;
        }
        entry.removed = true;
        self.removed += 1;
        if !entry.counted {
            entry.counted = true;
            self.reclaimable += 1;
        }
        true
    }

    /// Most recent entry for `key` in this base
    pub fn find(&self, key: &Key) -> Option<&BaseEntry> {
        if !self.sorted {
            return self.entries.iter().rev().find(|e| e.key == *key);
        }

        let candidates = if self.blocks.is_empty() {
            &self.entries[..]
        } else {
            let idx = self.blocks.partition_point(|b| b.end_key < *key);
            let block = self.blocks.get(idx)?;
            if block.start_key > *key || !block.bloom.may_contain(key.as_bytes()) {
                return None;
            }
            &self.entries[block.members()]
        };

        candidates
            .binary_search_by(|e| e.key.cmp(key))
            .ok()
            .map(|pos| &candidates[pos])
    }

    /// Entries whose key falls in `range`, in file order, limited to the
    /// first `limit` entries of the base
    pub fn entries_in(&self, range: &KeyRange, limit: usize) -> Vec<BaseEntry> {
        let bounded = &self.entries[..limit.min(self.entries.len())];

        if !self.sorted {
            return bounded
                .iter()
                .filter(|e| range.contains(&e.key))
                .copied()
                .collect();
        }

        // Seek to the first block that can hold range.start
        let start = if self.blocks.is_empty() {
            bounded.partition_point(|e| e.key < range.start)
        } else {
            let idx = self.blocks.partition_point(|b| b.end_key < range.start);
            match self.blocks.get(idx) {
                Some(block) if range.overlaps(&block.start_key, &block.end_key) => {
                    let members = &bounded[block.first.min(bounded.len())..];
                    block.first + members.partition_point(|e| e.key < range.start)
                }
                // Past the last block, or the range falls between two blocks
                _ => bounded.len(),
            }
        };

        bounded[start.min(bounded.len())..]
            .iter()
            .take_while(|e| e.key <= range.end)
            .copied()
            .collect()
    }
}

// =============================================================================
// On-disk trailer
// =============================================================================

/// Trailer stored after the records of a sorted base, or alone in a view file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Trailer {
    /// Base whose file holds the records (views only)
    pub owner: Option<u64>,
    pub entries: Vec<TrailerEntry>,
    pub blocks: Vec<TrailerBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TrailerEntry {
    pub key: Key,
    pub offset: u64,
    pub data_size: u64,
    pub flags: RecordFlags,
    pub write_seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TrailerBlock {
    pub start_key: Key,
    pub end_key: Key,
    pub bloom: BloomFilter,
    pub first: u64,
    pub len: u64,
}

impl Trailer {
    pub fn new(owner: Option<u64>, entries: &[BaseEntry], blocks: &[IndexBlock]) -> Self {
        Self {
            owner,
            entries: entries
                .iter()
                .map(|e| TrailerEntry {
                    key: e.key,
                    offset: e.offset,
                    data_size: e.data_size,
                    flags: e.flags,
                    write_seq: e.write_seq,
                })
                .collect(),
            blocks: blocks
                .iter()
                .map(|b| TrailerBlock {
                    start_key: b.start_key,
                    end_key: b.end_key,
                    bloom: b.bloom.clone(),
                    first: b.first as u64,
                    len: b.len as u64,
                })
                .collect(),
        }
    }

    pub fn into_index(self) -> BaseIndex {
        let entries = self
            .entries
            .into_iter()
            .map(|e| BaseEntry {
                key: e.key,
                offset: e.offset,
                data_size: e.data_size,
                flags: e.flags,
                write_seq: e.write_seq,
                removed: false,
                counted: false,
            })
            .collect();
        let blocks = self
            .blocks
            .into_iter()
            .map(|b| IndexBlock {
                start_key: b.start_key,
                end_key: b.end_key,
                bloom: b.bloom,
                first: b.first as usize,
                len: b.len as usize,
            })
            .collect();
        BaseIndex::sorted(entries, blocks)
    }
}
