//! Sorted Base Builder
//!
//! Writes key-ordered records into a new sorted base file. Used by defrag for
//! every output base. Index blocks and their bloom filters are built while
//! records stream in; `finish()` appends the trailer and footer, syncs, and
//! moves the file from its temporary name to its final one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::bloom::BloomFilter;
use crate::config::Config;
use crate::error::{BasaltError, Result};

use super::index::{BaseEntry, BaseIndex, IndexBlock, Trailer};
use super::{file_header, BaseId, BaseKind, RawRecord, FILE_HEADER_SIZE, FOOTER_MAGIC};

/// Output of a finished builder, ready to be opened as a `Base`
pub struct BuiltBase {
    pub id: BaseId,
    pub path: PathBuf,
    pub index: BaseIndex,
    pub byte_size: u64,
}

/// Builder for a new sorted base
pub struct SortedBaseBuilder {
    id: BaseId,
    tmp_path: PathBuf,
    path: PathBuf,
    writer: BufWriter<File>,
    /// Current write position
    offset: u64,
    entries: Vec<BaseEntry>,
    blocks: Vec<IndexBlock>,
    /// Bloom filter of the block being filled
    open_bloom: Option<BloomFilter>,
    index_block_size: usize,
    bloom_false_positive_rate: f64,
    build_index: bool,
}

impl SortedBaseBuilder {
    /// Create the temporary output file and write its header
    pub fn create(dir: &Path, id: BaseId, config: &Config) -> Result<Self> {
        let path = super::base_path(dir, id, BaseKind::Sorted);
        let tmp_path = path.with_extension("blob.tmp");

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&file_header(id, BaseKind::Sorted))?;

        Ok(Self {
            id,
            tmp_path,
            path,
            writer,
            offset: FILE_HEADER_SIZE,
            entries: Vec::new(),
            blocks: Vec::new(),
            open_bloom: None,
            index_block_size: config.index_block_size,
            bloom_false_positive_rate: config.bloom_false_positive_rate,
            build_index: config.enable_sorted_index,
        })
    }

    pub fn id(&self) -> BaseId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_size(&self) -> u64 {
        self.offset
    }

    /// Whether one more record of `record_size` bytes stays within limits.
    /// An empty builder accepts any record.
    pub fn fits(&self, record_size: u64, config: &Config) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        (self.entries.len() as u64) < config.max_records_per_base
            && self.offset + record_size <= config.max_blob_size
    }

    /// Copy a verified record into the output. Keys must strictly ascend.
    pub fn add(&mut self, record: &RawRecord) -> Result<BaseEntry> {
        if let Some(last) = self.entries.last() {
            if record.header.key <= last.key {
                return Err(BasaltError::CorruptRecord(format!(
                    "sorted base {} received {:?} after {:?}",
                    self.id, record.header.key, last.key
                )));
            }
        }

        self.writer.write_all(&record.bytes)?;
        let entry = BaseEntry::from_header(&record.header, self.offset);
        self.offset += record.bytes.len() as u64;
        self.entries.push(entry);

        if self.build_index {
            let bloom = self.open_bloom.get_or_insert_with(|| {
                BloomFilter::new(self.index_block_size, self.bloom_false_positive_rate)
            });
            bloom.insert(entry.key.as_bytes());
            if self.entries.len() % self.index_block_size == 0 {
                self.close_block();
            }
        }
        Ok(entry)
    }

    /// Seal the block being filled, covering every entry added since the
    /// previous block
    fn close_block(&mut self) {
        let Some(bloom) = self.open_bloom.take() else {
            return;
        };
        let first = self.blocks.len() * self.index_block_size;
        let members = &self.entries[first..];
        self.blocks.push(IndexBlock {
            start_key: members[0].key,
            end_key: members[members.len() - 1].key,
            bloom,
            first,
            len: members.len(),
        });
    }

    /// Write trailer + footer, sync and move into place. On error the
    /// partial file is removed.
    pub fn finish(self) -> Result<BuiltBase> {
        let tmp_path = self.tmp_path.clone();
        self.write_out().map_err(|e| {
            if let Err(remove_err) = fs::remove_file(&tmp_path) {
                warn!(path = %tmp_path.display(), error = %remove_err, "failed to remove partial base");
            }
            e
        })
    }

    fn write_out(mut self) -> Result<BuiltBase> {
        self.close_block();

        let trailer = Trailer::new(None, &self.entries, &self.blocks);
        write_trailer(&mut self.writer, self.offset, &trailer)?;
        self.writer.flush()?;

        let file = self.writer.into_inner().map_err(|e| {
            BasaltError::Io(e.into_error())
        })?;
        file.sync_all()?;
        let byte_size = file.metadata()?.len();
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        debug!(
            base_id = self.id,
            records = self.entries.len(),
            blocks = self.blocks.len(),
            byte_size,
            "sorted base written"
        );

        Ok(BuiltBase {
            id: self.id,
            path: self.path,
            index: BaseIndex::sorted(self.entries, self.blocks),
            byte_size,
        })
    }

    /// Drop the partial output
    pub fn abandon(self) {
        let tmp_path = self.tmp_path.clone();
        drop(self.writer);
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!(path = %tmp_path.display(), error = %e, "failed to remove partial base");
        }
    }
}

/// Append a trailer and footer at `trailer_offset`
///
/// Footer: TrailerOffset (8) | TrailerLen (8) | TrailerCRC (4) | Magic (4)
pub(crate) fn write_trailer<W: Write>(
    writer: &mut W,
    trailer_offset: u64,
    trailer: &Trailer,
) -> Result<()> {
    let encoded = bincode::serialize(trailer)?;
    let crc = crc32fast::hash(&encoded);

    writer.write_all(&encoded)?;
    writer.write_all(&trailer_offset.to_le_bytes())?;
    writer.write_all(&(encoded.len() as u64).to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(FOOTER_MAGIC)?;
    Ok(())
}
