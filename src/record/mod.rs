//! Record Module
//!
//! On-disk record format shared by every base kind.
//!
//! ## Record Format
//! ```text
//! ┌──────────┬───────────┬───────────────┬───────────────┬─────────┬──────────┬───────────┐
//! │ Key (64) │ Flags (8) │ DataSize (8)  │ WriteSeq (8)  │ CRC (4) │ Rsvd (4) │  Payload  │
//! └──────────┴───────────┴───────────────┴───────────────┴─────────┴──────────┴───────────┘
//! ```
//! All integers are little endian. The CRC covers every header field before
//! it plus the payload.

mod flags;
mod header;

pub use flags::RecordFlags;
pub use header::DiskHeader;

/// Header size: Key (64) + Flags (8) + DataSize (8) + WriteSeq (8) + CRC (4) + Reserved (4)
pub const HEADER_SIZE: u64 = 96;
