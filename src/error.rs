//! Error types for Basalt
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::base::BaseId;

/// Result type alias using BasaltError
pub type Result<T> = std::result::Result<T, BasaltError>;

/// Unified error type for Basalt operations
#[derive(Debug, Error)]
pub enum BasaltError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record / Base Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Key not found")]
    KeyNotFound,

    /// The writable base reached one of its limits. Handled by rotation
    /// inside the write path and never returned from the public API.
    #[error("Base {base_id} is full")]
    BaseFull { base_id: BaseId },

    #[error("Unknown base: {0}")]
    UnknownBase(BaseId),

    #[error("Base {base_id} still has {refs} outstanding view reference(s)")]
    ViewConflict { base_id: BaseId, refs: usize },

    // -------------------------------------------------------------------------
    // Defrag Errors
    // -------------------------------------------------------------------------
    /// Compaction failed before commit; registry and index are unchanged.
    #[error("Defrag aborted: {0}")]
    DefragAborted(#[source] Box<BasaltError>),

    // -------------------------------------------------------------------------
    // Iteration Errors
    // -------------------------------------------------------------------------
    #[error("Iteration aborted after {delivered} record(s): {source}")]
    IterationAborted {
        delivered: usize,
        #[source]
        source: Box<BasaltError>,
    },

    /// Convenience variant for visitors that fail for their own reasons
    #[error("Visitor error: {0}")]
    Visitor(String),

    // -------------------------------------------------------------------------
    // Manifest / Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BasaltError {
    fn from(e: bincode::Error) -> Self {
        BasaltError::Serialization(e.to_string())
    }
}
