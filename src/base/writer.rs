//! Append path of the writable base

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use tracing::warn;

use crate::config::SyncStrategy;
use crate::error::Result;

/// Exclusive appender for the current base
///
/// A record is written as one buffer at the end offset. If the write fails
/// the file is truncated back, so a half-written record never survives.
pub(crate) struct BaseWriter {
    file: File,
    /// Next append offset
    end: u64,
    sync_strategy: SyncStrategy,
}

impl BaseWriter {
    pub fn new(file: File, end: u64, sync_strategy: SyncStrategy) -> Self {
        Self {
            file,
            end,
            sync_strategy,
        }
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Write `record` at the end of the file, returning its offset
    pub fn append(&mut self, record: &[u8]) -> Result<u64> {
        let offset = self.end;

        if let Err(e) = self.write_at_end(record) {
            if let Err(truncate_err) = self.file.set_len(offset) {
                warn!(offset, error = %truncate_err, "failed to roll back partial record");
            }
            return Err(e.into());
        }

        if self.sync_strategy == SyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }

        self.end += record.len() as u64;
        Ok(offset)
    }

    fn write_at_end(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(record)?;
        self.file.flush()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
