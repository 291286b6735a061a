//! Error types for the entry log store.

use crate::types::{EntryId, LedgerId, Location, SegmentId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in entry log store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage channel error.
    #[error("storage error: {0}")]
    Storage(#[from] ledgerlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read asked for a segment whose file is absent from every
    /// storage directory.
    #[error("no segment file for {segment_id} ({ledger_id}, location {location})")]
    SegmentNotFound {
        /// The segment whose file could not be located.
        segment_id: SegmentId,
        /// The ledger the caller was reading.
        ledger_id: LedgerId,
        /// The location the caller was resolving.
        location: Location,
    },

    /// A read returned fewer bytes than requested.
    #[error("short read from {segment_id} at {pos}: wanted {wanted}, got {got}")]
    ShortRead {
        /// The segment being read.
        segment_id: SegmentId,
        /// The file offset of the read.
        pos: u64,
        /// Bytes requested.
        wanted: usize,
        /// Bytes actually read.
        got: usize,
    },

    /// A decoded frame's identity disagrees with the caller's request.
    #[error(
        "entry at {location} belongs to {found_ledger}/{found_entry}, \
         not {expected_ledger}/{expected_entry}"
    )]
    IdentityMismatch {
        /// The location that was read.
        location: Location,
        /// The ledger the caller asked for.
        expected_ledger: LedgerId,
        /// The entry the caller asked for.
        expected_entry: EntryId,
        /// The ledger recorded in the frame.
        found_ledger: LedgerId,
        /// The entry recorded in the frame.
        found_entry: EntryId,
    },

    /// A segment's contents are not a valid frame sequence.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The store configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration issue.
        message: String,
    },
}

impl CoreError {
    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
