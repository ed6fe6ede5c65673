//! Record header encoding
//!
//! Every record is written as one contiguous buffer: header then payload.
//! The checksum covers the header fields and the payload, so a torn write
//! or a flipped bit anywhere in the record is detected on read.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BasaltError, Result};
use crate::key::{Key, KEY_SIZE};

use super::{RecordFlags, HEADER_SIZE};

/// Byte offsets of the header fields
const FLAGS_AT: usize = KEY_SIZE;
const DATA_SIZE_AT: usize = FLAGS_AT + 8;
const WRITE_SEQ_AT: usize = DATA_SIZE_AT + 8;
const CRC_AT: usize = WRITE_SEQ_AT + 8;

/// Fixed-size header preceding each payload on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskHeader {
    pub key: Key,
    pub flags: RecordFlags,
    pub data_size: u64,
    pub write_seq: u64,
}

impl DiskHeader {
    pub fn new(key: Key, flags: RecordFlags, data_size: u64, write_seq: u64) -> Self {
        Self {
            key,
            flags,
            data_size,
            write_seq,
        }
    }

    /// Header for a tombstone (no payload)
    pub fn tombstone(key: Key, write_seq: u64) -> Self {
        Self::new(key, RecordFlags::REMOVE, 0, write_seq)
    }

    pub fn is_removed(&self) -> bool {
        self.flags.is_removed()
    }

    /// Total on-disk size of the record (header + payload)
    /// Saturates on a garbage `data_size`, so torn tails fail bounds checks
    pub fn record_size(&self) -> u64 {
        HEADER_SIZE.saturating_add(self.data_size)
    }

    /// CRC32 over the header fields followed by the payload
    pub fn checksum(&self, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.key.as_bytes());
        hasher.update(&self.flags.bits().to_le_bytes());
        hasher.update(&self.data_size.to_le_bytes());
        hasher.update(&self.write_seq.to_le_bytes());
        hasher.update(payload);
        hasher.finalize()
    }

    /// Encode header + payload into a single buffer ready for one write
    pub fn encode_record(&self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() as u64 != self.data_size {
            return Err(BasaltError::CorruptRecord(format!(
                "payload is {} bytes but header says {}",
                payload.len(),
                self.data_size
            )));
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize + payload.len());
        buf.put_slice(self.key.as_bytes());
        buf.put_u64_le(self.flags.bits());
        buf.put_u64_le(self.data_size);
        buf.put_u64_le(self.write_seq);
        buf.put_u32_le(self.checksum(payload));
        buf.put_u32_le(0); // reserved
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    /// Decode a header, returning it with the stored checksum
    pub fn decode(buf: &[u8]) -> Result<(Self, u32)> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(BasaltError::CorruptRecord(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let key = Key::from_slice(&buf[..KEY_SIZE])
            .ok_or_else(|| BasaltError::CorruptRecord("bad key length".to_string()))?;
        let flags = RecordFlags::from_bits(read_u64(buf, FLAGS_AT));
        let data_size = read_u64(buf, DATA_SIZE_AT);
        let write_seq = read_u64(buf, WRITE_SEQ_AT);
        let crc = u32::from_le_bytes([
            buf[CRC_AT],
            buf[CRC_AT + 1],
            buf[CRC_AT + 2],
            buf[CRC_AT + 3],
        ]);

        Ok((Self::new(key, flags, data_size, write_seq), crc))
    }

    /// Check a decoded record against its stored checksum
    pub fn verify(&self, stored_crc: u32, payload: &[u8]) -> Result<()> {
        let actual = self.checksum(payload);
        if actual != stored_crc {
            return Err(BasaltError::CorruptRecord(format!(
                "checksum mismatch for {:?}: stored {:#010x}, computed {:#010x}",
                self.key, stored_crc, actual
            )));
        }
        Ok(())
    }
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}
