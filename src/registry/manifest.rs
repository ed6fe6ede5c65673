//! Manifest - persisted registry order
//!
//! Records which bases make up the store, in registry order, and the next
//! base id to hand out. Recovery trusts the manifest over the directory
//! listing: files it does not reference (and no view borrows from) are
//! leftovers of an interrupted rotation or defrag.
//!
//! ## File Format
//! ```text
//! ┌───────────┬─────────────┬──────────────────────────┐
//! │ CRC32 (4) │ Length (8)  │ bincode(ManifestData)    │
//! └───────────┴─────────────┴──────────────────────────┘
//! ```
//!
//! The manifest is rewritten atomically: write `MANIFEST.tmp`, fsync, then
//! rename over `MANIFEST`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::base::{BaseId, BaseKind};
use crate::error::{BasaltError, Result};

/// Name of the manifest file within the data directory
pub const MANIFEST_FILENAME: &str = "MANIFEST";

const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// CRC (4) + Length (8)
const MANIFEST_HEADER_SIZE: usize = 12;

/// One base as listed in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: BaseId,
    pub kind: BaseKind,
}

/// Decoded manifest contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestData {
    pub next_id: BaseId,
    /// Registry order; the last entry is the current base
    pub bases: Vec<ManifestEntry>,
}

/// Handle on the manifest file of a data directory
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
}

impl Manifest {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(MANIFEST_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest; `None` if the directory has never been opened
    pub fn load(&self) -> Result<Option<ManifestData>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if raw.len() < MANIFEST_HEADER_SIZE {
            return Err(BasaltError::Manifest(format!(
                "manifest is {} bytes, shorter than its header",
                raw.len()
            )));
        }

        let stored_crc = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&raw[4..12]);
        let len = u64::from_le_bytes(len_bytes) as usize;

        let body = &raw[MANIFEST_HEADER_SIZE..];
        if body.len() != len {
            return Err(BasaltError::Manifest(format!(
                "manifest body is {} bytes, header says {}",
                body.len(),
                len
            )));
        }
        if crc32fast::hash(body) != stored_crc {
            return Err(BasaltError::Manifest("checksum mismatch".to_string()));
        }

        let data: ManifestData = bincode::deserialize(body)?;
        Ok(Some(data))
    }

    /// Atomically replace the manifest with `data`
    pub fn save(&self, data: &ManifestData) -> Result<()> {
        let body = bincode::serialize(data)?;
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);

        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            f.write_all(&crc32fast::hash(&body).to_le_bytes())?;
            f.write_all(&(body.len() as u64).to_le_bytes())?;
            f.write_all(&body)?;
            f.flush()?;
            f.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        debug!(bases = data.bases.len(), next_id = data.next_id, "manifest saved");
        Ok(())
    }
}
