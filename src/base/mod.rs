//! Base Module
//!
//! A base is one append-only segment file plus the in-memory headers of
//! its records. It is the unit of storage, rotation and compaction.
//!
//! ## Responsibilities
//! - Append records to the writable (current) base
//! - Read and checksum-verify records by offset
//! - Keep per-record "removed" marks and reclaimable accounting
//! - Load bases back from disk on startup
//! - Own or borrow (view) the bytes it serves
//!
//! ## File Formats
//! ```text
//! Unsorted base (data-NNNNNN.blob)        Sorted base (data-NNNNNN.blob)
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │ File Header (16)             │        │ File Header (16)             │
//! ├──────────────────────────────┤        ├──────────────────────────────┤
//! │ Record (write order)         │        │ Record (key order)           │
//! │ ...                          │        │ ...                          │
//! └──────────────────────────────┘        ├──────────────────────────────┤
//!                                         │ Trailer (bincode)            │
//! View base (data-NNNNNN.view)            │   entries + index blocks     │
//! ┌──────────────────────────────┐        ├──────────────────────────────┤
//! │ File Header (16)             │        │ Footer (24)                  │
//! ├──────────────────────────────┤        └──────────────────────────────┘
//! │ Trailer (owner id, entries,  │
//! │   index blocks)              │
//! ├──────────────────────────────┤
//! │ Footer (24)                  │
//! └──────────────────────────────┘
//!
//! File Header: Magic "BSLT" (4) | Version u16 (2) | Kind u8 (1) | Reserved (1) | Id u64 (8)
//! Footer:      TrailerOffset u64 (8) | TrailerLen u64 (8) | TrailerCRC u32 (4) | Magic "BSLF" (4)
//! ```

mod builder;
mod index;
mod view;
mod writer;

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{BasaltError, Result};
use crate::key::{Key, KeyRange};
use crate::record::{DiskHeader, HEADER_SIZE};

pub use builder::{BuiltBase, SortedBaseBuilder};
pub use index::{BaseEntry, BaseIndex, IndexBlock};
pub use view::View;

use builder::write_trailer;
use index::Trailer;
use writer::BaseWriter;

/// Stable base identifier, assigned in creation order
pub type BaseId = u64;

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a Basalt base file
pub(crate) const MAGIC: &[u8; 4] = b"BSLT";

/// Magic bytes closing a trailer footer
pub(crate) const FOOTER_MAGIC: &[u8; 4] = b"BSLF";

/// Current base format version
pub(crate) const VERSION: u16 = 1;

/// File header: Magic (4) + Version (2) + Kind (1) + Reserved (1) + Id (8)
pub(crate) const FILE_HEADER_SIZE: u64 = 16;

/// Footer: TrailerOffset (8) + TrailerLen (8) + TrailerCRC (4) + Magic (4)
pub(crate) const FOOTER_SIZE: u64 = 24;

/// What a base holds and how its bytes are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseKind {
    /// Records in write order; the current base is always unsorted
    Unsorted,
    /// Records in strictly ascending key order, with a trailer
    Sorted,
    /// Sorted records borrowed from another base's file
    View { owner: BaseId },
}

impl BaseKind {
    fn code(self) -> u8 {
        match self {
            BaseKind::Unsorted => 0,
            BaseKind::Sorted => 1,
            BaseKind::View { .. } => 2,
        }
    }

    pub fn is_sorted(self) -> bool {
        !matches!(self, BaseKind::Unsorted)
    }
}

/// Build the 16-byte file header
pub(crate) fn file_header(id: BaseId, kind: BaseKind) -> [u8; FILE_HEADER_SIZE as usize] {
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header[6] = kind.code();
    header[8..16].copy_from_slice(&id.to_le_bytes());
    header
}

/// Path of a base file: `data-000042.blob` or `data-000042.view`
pub fn base_path(dir: &Path, id: BaseId, kind: BaseKind) -> PathBuf {
    match kind {
        BaseKind::View { .. } => dir.join(format!("data-{:06}.view", id)),
        _ => dir.join(format!("data-{:06}.blob", id)),
    }
}

/// Parse the base id out of a base file name
/// "data-000042.blob" → Some(42)
pub fn parse_base_id(path: &Path) -> Option<BaseId> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix("data-")?;
    let (id, _ext) = rest.split_once('.')?;
    id.parse().ok()
}

// =============================================================================
// Positioned Reads
// =============================================================================

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Where a base's record bytes live
pub(crate) enum Storage {
    File(File),
    View(View),
}

impl Storage {
    pub(crate) fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        match self {
            Storage::File(file) => Ok(read_exact_at(file, buf, offset)?),
            Storage::View(view) => view.read_at(buf, offset),
        }
    }
}

/// A record read back from disk, checksum verified
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub header: DiskHeader,
    /// Header and payload exactly as stored
    pub bytes: Bytes,
}

impl RawRecord {
    /// Encode a record in memory
    pub fn new(header: DiskHeader, payload: &[u8]) -> Result<Self> {
        let bytes = header.encode_record(payload)?;
        Ok(Self { header, bytes })
    }

    pub fn payload(&self) -> Bytes {
        self.bytes.slice(HEADER_SIZE as usize..)
    }
}

/// Point-in-time counters of one base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseStats {
    pub id: BaseId,
    pub kind: BaseKind,
    pub records: u64,
    pub removed: u64,
    pub reclaimable: u64,
    pub tombstones: u64,
    pub byte_size: u64,
    pub view_refs: usize,
    pub index_blocks: usize,
    pub writable: bool,
}

// =============================================================================
// Base
// =============================================================================

/// One segment file and its in-memory record headers
///
/// ## Concurrency:
/// - `index`: RwLock; readers clone entry lists, the write path and
///   stale-marking take it briefly for writing
/// - `writer`: Some only while this is the current base; Mutex serializes
///   appends (the engine's write lock already does, this keeps Base safe
///   on its own)
/// - Reads use positioned I/O, so any number of threads can read at once
pub struct Base {
    id: BaseId,
    kind: BaseKind,
    path: PathBuf,
    pub(crate) storage: Storage,
    index: RwLock<BaseIndex>,
    writer: Mutex<Option<BaseWriter>>,
    byte_size: AtomicU64,
    pub(crate) view_refs: AtomicUsize,
    retired: AtomicBool,
    unlinked: AtomicBool,
    /// Set when a registered view closes over this base: its bytes are
    /// still needed on the next open
    pinned: AtomicBool,
}

impl Base {
    fn assemble(
        id: BaseId,
        kind: BaseKind,
        path: PathBuf,
        storage: Storage,
        index: BaseIndex,
        writer: Option<BaseWriter>,
        byte_size: u64,
    ) -> Self {
        Self {
            id,
            kind,
            path,
            storage,
            index: RwLock::new(index),
            writer: Mutex::new(writer),
            byte_size: AtomicU64::new(byte_size),
            view_refs: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            unlinked: AtomicBool::new(false),
            pinned: AtomicBool::new(false),
        }
    }

    /// Create a new, empty, writable base
    pub fn create(dir: &Path, id: BaseId, config: &Config) -> Result<Self> {
        let path = base_path(dir, id, BaseKind::Unsorted);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(&file_header(id, BaseKind::Unsorted))?;
        file.sync_all()?;

        let writer = BaseWriter::new(file.try_clone()?, FILE_HEADER_SIZE, config.sync_strategy);
        debug!(base_id = id, path = %path.display(), "created base");

        Ok(Self::assemble(
            id,
            BaseKind::Unsorted,
            path,
            Storage::File(file),
            BaseIndex::unsorted(),
            Some(writer),
            FILE_HEADER_SIZE,
        ))
    }

    /// Open the output of a `SortedBaseBuilder`
    pub fn from_built(built: BuiltBase) -> Result<Self> {
        let file = File::open(&built.path)?;
        Ok(Self::assemble(
            built.id,
            BaseKind::Sorted,
            built.path,
            Storage::File(file),
            built.index,
            None,
            built.byte_size,
        ))
    }

    /// Create a view base serving `entries` straight out of `owner`'s file.
    /// `entries` must be non-empty, key ordered, and belong to `owner`.
    pub fn create_view(
        dir: &Path,
        id: BaseId,
        owner: Arc<Base>,
        entries: Vec<BaseEntry>,
        config: &Config,
    ) -> Result<Self> {
        let (first, last) = match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(BasaltError::CorruptRecord(format!(
                    "view {} over base {} has no entries",
                    id,
                    owner.id()
                )))
            }
        };

        let view = View::new(owner, first.offset, last.offset + last.record_size())?;
        let kind = BaseKind::View {
            owner: view.owner_id(),
        };

        let entries: Vec<BaseEntry> = entries
            .into_iter()
            .map(|e| BaseEntry {
                removed: false,
                counted: false,
                ..e
            })
            .collect();
        let blocks = if config.enable_sorted_index {
            IndexBlock::build_all(&entries, config)
        } else {
            Vec::new()
        };

        let path = base_path(dir, id, kind);
        let tmp_path = path.with_extension("view.tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&file_header(id, kind))?;
            let trailer = Trailer::new(Some(view.owner_id()), &entries, &blocks);
            write_trailer(&mut file, FILE_HEADER_SIZE, &trailer)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        let byte_size = view.len();
        debug!(
            base_id = id,
            owner = view.owner_id(),
            range = ?view.range(),
            records = entries.len(),
            "created view base"
        );

        Ok(Self::assemble(
            id,
            kind,
            path,
            Storage::View(view),
            BaseIndex::sorted(entries, blocks),
            None,
            byte_size,
        ))
    }

    /// Load a base from disk
    ///
    /// Unsorted bases are scanned record by record; a torn or corrupt tail
    /// is truncated away. Sorted and view bases are loaded from their
    /// trailer without reading any payload. `owner` must be given for
    /// views. `writable` reopens an unsorted base for appends.
    pub fn open(
        dir: &Path,
        id: BaseId,
        kind: BaseKind,
        owner: Option<Arc<Base>>,
        config: &Config,
        writable: bool,
    ) -> Result<Self> {
        let path = base_path(dir, id, kind);
        let mut file = OpenOptions::new()
            .read(true)
            .write(kind == BaseKind::Unsorted)
            .open(&path)?;
        check_file_header(&mut file, id, kind)?;

        match kind {
            BaseKind::Unsorted => {
                let (index, end) = scan_unsorted(&file, id)?;
                let file_len = file.metadata()?.len();
                if end < file_len {
                    warn!(
                        base_id = id,
                        valid_bytes = end,
                        file_bytes = file_len,
                        "truncating torn tail"
                    );
                    file.set_len(end)?;
                }
                let writer = if writable {
                    Some(BaseWriter::new(file.try_clone()?, end, config.sync_strategy))
                } else {
                    None
                };
                Ok(Self::assemble(
                    id,
                    kind,
                    path,
                    Storage::File(file),
                    index,
                    writer,
                    end,
                ))
            }
            BaseKind::Sorted => {
                let trailer = read_trailer(&mut file, id)?;
                let byte_size = file.metadata()?.len();
                Ok(Self::assemble(
                    id,
                    kind,
                    path,
                    Storage::File(file),
                    trailer.into_index(),
                    None,
                    byte_size,
                ))
            }
            BaseKind::View { owner: owner_id } => {
                let trailer = read_trailer(&mut file, id)?;
                if trailer.owner != Some(owner_id) {
                    return Err(BasaltError::CorruptRecord(format!(
                        "view {} trailer names owner {:?}, manifest says {}",
                        id, trailer.owner, owner_id
                    )));
                }
                let owner = owner.ok_or(BasaltError::UnknownBase(owner_id))?;
                let index = trailer.into_index();
                let (start, end) = match (index.entries().first(), index.entries().last()) {
                    (Some(first), Some(last)) => (first.offset, last.offset + last.record_size()),
                    _ => (FILE_HEADER_SIZE, FILE_HEADER_SIZE),
                };
                let view = View::new(owner, start, end)?;
                let byte_size = view.len();
                Ok(Self::assemble(
                    id,
                    kind,
                    path,
                    Storage::View(view),
                    index,
                    None,
                    byte_size,
                ))
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> BaseId {
        self.id
    }

    pub fn kind(&self) -> BaseKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of record data this base serves (file size for owned bases)
    pub fn byte_size(&self) -> u64 {
        self.byte_size.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> u64 {
        self.index.read().len() as u64
    }

    pub fn view_refs(&self) -> usize {
        self.view_refs.load(Ordering::SeqCst)
    }

    pub fn is_writable(&self) -> bool {
        self.writer.lock().is_some()
    }

    pub fn is_sorted(&self) -> bool {
        self.kind.is_sorted()
    }

    /// Sorted (or a view) and holding no tombstone records
    pub fn is_clean_sorted(&self) -> bool {
        self.is_sorted() && self.index.read().tombstones == 0
    }

    pub fn reclaimable(&self) -> u64 {
        self.index.read().reclaimable
    }

    /// The view this base reads through, if it is a view base
    pub fn view(&self) -> Option<&View> {
        match &self.storage {
            Storage::View(view) => Some(view),
            Storage::File(_) => None,
        }
    }

    pub(crate) fn index(&self) -> RwLockReadGuard<'_, BaseIndex> {
        self.index.read()
    }

    pub fn stats(&self) -> BaseStats {
        // Writer before index, as in append
        let writable = self.is_writable();
        let index = self.index.read();
        BaseStats {
            id: self.id,
            kind: self.kind,
            records: index.len() as u64,
            removed: index.removed,
            reclaimable: index.reclaimable,
            tombstones: index.tombstones,
            byte_size: self.byte_size(),
            view_refs: self.view_refs(),
            index_blocks: index.blocks().len(),
            writable,
        }
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Append one record. Returns `BaseFull` when the base is sealed or the
    /// record would break `max_records_per_base` / `max_blob_size`.
    pub fn append(&self, header: &DiskHeader, payload: &[u8], config: &Config) -> Result<BaseEntry> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or(BasaltError::BaseFull { base_id: self.id })?;

        let count = self.index.read().len() as u64;
        let over_count = count >= config.max_records_per_base;
        let over_size = count > 0 && writer.end() + header.record_size() > config.max_blob_size;
        if over_count || over_size {
            return Err(BasaltError::BaseFull { base_id: self.id });
        }

        let record = header.encode_record(payload)?;
        let offset = writer.append(&record)?;
        self.byte_size.store(writer.end(), Ordering::SeqCst);

        // Visible only once the bytes are on disk
        let entry = BaseEntry::from_header(header, offset);
        self.index.write().push(entry);
        Ok(entry)
    }

    /// Stop accepting appends and sync the file
    pub fn seal(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().take() {
            writer.sync()?;
            debug!(base_id = self.id, records = self.record_count(), "sealed base");
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.sync()?;
        }
        Ok(())
    }

    /// Flag the record at `offset` as superseded
    pub fn mark_removed(&self, offset: u64) -> bool {
        self.index.write().mark_removed(offset)
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Read and verify the record at `offset`, expecting `data_size` payload
    /// bytes
    pub fn read_record(&self, offset: u64, data_size: u64) -> Result<RawRecord> {
        let mut buf = vec![0u8; (HEADER_SIZE + data_size) as usize];
        self.storage.read_at(&mut buf, offset)?;

        let (header, crc) = DiskHeader::decode(&buf)?;
        if header.data_size != data_size {
            return Err(BasaltError::CorruptRecord(format!(
                "base {} offset {}: header says {} bytes, expected {}",
                self.id, offset, header.data_size, data_size
            )));
        }
        header.verify(crc, &buf[HEADER_SIZE as usize..])?;

        Ok(RawRecord {
            header,
            bytes: Bytes::from(buf),
        })
    }

    /// Payload of the record at `offset`
    pub fn read(&self, offset: u64, size: u64) -> Result<Bytes> {
        Ok(self.read_record(offset, size)?.payload())
    }

    /// Most recent entry for `key` in this base, from headers only
    pub fn find(&self, key: &Key) -> Option<BaseEntry> {
        self.index.read().find(key).copied()
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.find(key).is_some()
    }

    pub fn entry_at(&self, offset: u64) -> Option<BaseEntry> {
        let index = self.index.read();
        index.position_of(offset).map(|pos| index.entries()[pos])
    }

    /// Copy of every entry, in file order
    pub fn entries(&self) -> Vec<BaseEntry> {
        self.index.read().entries().to_vec()
    }

    /// Entries with keys in `range` among the first `limit` entries
    pub fn entries_in(&self, range: &KeyRange, limit: usize) -> Vec<BaseEntry> {
        self.index.read().entries_in(range, limit)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Mark as replaced; the file goes away with the last handle
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Remove the file right now. Refused while views borrow this base.
    pub fn destroy(&self) -> Result<()> {
        let refs = self.view_refs();
        if refs > 0 {
            return Err(BasaltError::ViewConflict {
                base_id: self.id,
                refs,
            });
        }
        self.retired.store(true, Ordering::SeqCst);
        if !self.unlinked.swap(true, Ordering::SeqCst) {
            match fs::remove_file(&self.path) {
                Ok(()) => debug!(base_id = self.id, "destroyed base"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for Base {
    fn drop(&mut self) {
        let retired = self.retired.load(Ordering::SeqCst);
        if let Storage::View(view) = &self.storage {
            if !retired {
                view.owner().pinned.store(true, Ordering::SeqCst);
            }
        }
        if !retired || self.unlinked.load(Ordering::SeqCst) || self.pinned.load(Ordering::SeqCst) {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => info!(base_id = self.id, path = %self.path.display(), "removed retired base"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(base_id = self.id, error = %e, "failed to remove retired base"),
        }
    }
}

impl std::fmt::Debug for Base {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Base")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("records", &self.record_count())
            .field("byte_size", &self.byte_size())
            .finish()
    }
}

// =============================================================================
// Loading Helpers
// =============================================================================

fn check_file_header(file: &mut File, id: BaseId, kind: BaseKind) -> Result<()> {
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;

    if &header[0..4] != MAGIC {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: invalid magic {:?}",
            id,
            &header[0..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: unsupported version {}",
            id, version
        )));
    }
    if header[6] != kind.code() {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: kind code {} does not match {:?}",
            id, header[6], kind
        )));
    }
    let mut stored_id = [0u8; 8];
    stored_id.copy_from_slice(&header[8..16]);
    if u64::from_le_bytes(stored_id) != id {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: file header carries id {}",
            id,
            u64::from_le_bytes(stored_id)
        )));
    }
    Ok(())
}

/// Walk an unsorted base, returning its index and the end of the last
/// intact record
fn scan_unsorted(file: &File, id: BaseId) -> Result<(BaseIndex, u64)> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(FILE_HEADER_SIZE))?;

    let mut index = BaseIndex::unsorted();
    let mut offset = FILE_HEADER_SIZE;
    let mut header_buf = [0u8; HEADER_SIZE as usize];

    while offset + HEADER_SIZE <= file_len {
        reader.read_exact(&mut header_buf)?;
        let (header, crc) = DiskHeader::decode(&header_buf)?;

        let end = offset.saturating_add(header.record_size());
        if end > file_len {
            break; // torn payload
        }

        let mut payload = vec![0u8; header.data_size as usize];
        reader.read_exact(&mut payload)?;
        if let Err(e) = header.verify(crc, &payload) {
            warn!(base_id = id, offset, error = %e, "stopping scan at corrupt record");
            break;
        }

        if !header.flags.is_uncommitted() {
            index.push(BaseEntry::from_header(&header, offset));
        }
        offset = end;
    }

    Ok((index, offset))
}

fn read_trailer(file: &mut File, id: BaseId) -> Result<Trailer> {
    let file_len = file.metadata()?.len();
    if file_len < FILE_HEADER_SIZE + FOOTER_SIZE {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: {} bytes is too short for a trailer",
            id, file_len
        )));
    }

    let mut footer = [0u8; FOOTER_SIZE as usize];
    file.seek(SeekFrom::Start(file_len - FOOTER_SIZE))?;
    file.read_exact(&mut footer)?;
    if &footer[20..24] != FOOTER_MAGIC {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: missing trailer footer",
            id
        )));
    }

    let mut word = [0u8; 8];
    word.copy_from_slice(&footer[0..8]);
    let trailer_offset = u64::from_le_bytes(word);
    word.copy_from_slice(&footer[8..16]);
    let trailer_len = u64::from_le_bytes(word);
    let stored_crc = u32::from_le_bytes([footer[16], footer[17], footer[18], footer[19]]);

    if trailer_offset + trailer_len + FOOTER_SIZE != file_len {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: trailer [{}, +{}) does not end at footer",
            id, trailer_offset, trailer_len
        )));
    }

    let mut encoded = vec![0u8; trailer_len as usize];
    file.seek(SeekFrom::Start(trailer_offset))?;
    file.read_exact(&mut encoded)?;
    if crc32fast::hash(&encoded) != stored_crc {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: trailer checksum mismatch",
            id
        )));
    }

    let trailer: Trailer = bincode::deserialize(&encoded)?;
    let entry_count = trailer.entries.len() as u64;
    if trailer.blocks.iter().any(|b| b.first + b.len > entry_count) {
        return Err(BasaltError::CorruptRecord(format!(
            "base {}: index block points past {} entries",
            id, entry_count
        )));
    }
    Ok(trailer)
}
