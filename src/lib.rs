//! # Basalt
//!
//! An append-only blob storage engine with:
//! - Segment files ("bases") holding checksummed records under 64-byte keys
//! - An in-memory record index for lookups without disk seeks
//! - Online defragmentation: merge, sort and tombstone compaction of bases
//! - Views that re-expose unchanged byte ranges instead of copying them
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │        insert / remove / lookup / iterate / compact         │
//! └──────┬───────────────────┬───────────────────────┬──────────┘
//!        │                   │                       │
//!        ▼                   ▼                       ▼
//! ┌─────────────┐    ┌───────────────┐      ┌─────────────────┐
//! │ Record Index│    │ Base Registry │◄─────│  Defrag Engine  │
//! │ key → slot  │    │ Vec<Arc<Base>>│      │ plan/merge/     │
//! └─────────────┘    │  + MANIFEST   │      │ commit/periodic │
//!                    └───────┬───────┘      └─────────────────┘
//!                            │
//!          ┌─────────────────┼──────────────────┐
//!          ▼                 ▼                  ▼
//!   ┌─────────────┐   ┌─────────────┐    ┌─────────────┐
//!   │  Unsorted   │   │   Sorted    │    │    View     │
//!   │ (current)   │   │ + blocks    │───►│ (borrows a  │
//!   │             │   │ + blooms    │    │  range)     │
//!   └─────────────┘   └─────────────┘    └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod base;
pub mod bloom;
pub mod defrag;
pub mod engine;
pub mod index;
pub mod iterator;
pub mod key;
pub mod record;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, SyncStrategy};
pub use defrag::{CompactReport, CompactTarget};
pub use engine::{Engine, EngineStats};
pub use error::{BasaltError, Result};
pub use iterator::{IterateFlags, RecordRef, RecordScan};
pub use key::{Key, KeyRange};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Basalt
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
